//! Byte-level enumerations of the Kocom bus.

use serde::Serialize;

use crate::error::Error;

/// Device category, taken from the first byte of a bus address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Wallpad,
    Light,
    Gas,
    Doorlock,
    Thermostat,
    Ac,
    Outlet,
    Ev,
    Fan,
    Motion,
    Ignore,
    Iaq,
}

impl DeviceType {
    pub fn code(self) -> u8 {
        match self {
            Self::Wallpad => 0x01,
            Self::Light => 0x0e,
            Self::Gas => 0x2c,
            Self::Doorlock => 0x33,
            Self::Thermostat => 0x36,
            Self::Ac => 0x39,
            Self::Outlet => 0x3b,
            Self::Ev => 0x44,
            Self::Fan => 0x48,
            Self::Motion => 0x60,
            Self::Ignore => 0x86,
            Self::Iaq => 0x98,
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::Wallpad,
            0x0e => Self::Light,
            0x2c => Self::Gas,
            0x33 => Self::Doorlock,
            0x36 => Self::Thermostat,
            0x39 => Self::Ac,
            0x3b => Self::Outlet,
            0x44 => Self::Ev,
            0x48 => Self::Fan,
            0x60 => Self::Motion,
            0x86 => Self::Ignore,
            0x98 => Self::Iaq,
            other => return Err(Error::UnknownDeviceType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Status,
    On,
    Off,
    Detect,
    Scan,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Self::Status => 0x00,
            Self::On => 0x01,
            Self::Off => 0x02,
            Self::Detect => 0x04,
            Self::Scan => 0x3a,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Status,
            0x01 => Self::On,
            0x02 => Self::Off,
            0x04 => Self::Detect,
            0x3a => Self::Scan,
            other => return Err(Error::UnknownCommand(other)),
        })
    }
}

/// Direction of a frame: sent by the wallpad, or a device reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PacketType {
    Send,
    Recv,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(nibble: u8) -> Result<Self, Self::Error> {
        match nibble {
            0x0b => Ok(Self::Send),
            0x0d => Ok(Self::Recv),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

macro_rules! byte_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
        #[serde(rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$variant),)+
                    other => Err(Error::InvalidValue { field: $field, value: other }),
                }
            }
        }
    };
}

byte_enum!(
    /// Air conditioner operating mode.
    OpMode, "op_mode" {
        Cool = 0x00,
        FanOnly = 0x01,
        Dry = 0x02,
        Auto = 0x03,
    }
);

byte_enum!(
    /// Air conditioner fan mode. `Unknown` is reported while idle.
    FanMode, "fan_mode" {
        Unknown = 0x00,
        Low = 0x01,
        Medium = 0x02,
        High = 0x03,
    }
);

byte_enum!(
    /// Ventilator mode.
    VentMode, "vent_mode" {
        Unknown = 0x00,
        Ventilation = 0x01,
        Auto = 0x02,
        Bypass = 0x03,
        Night = 0x05,
        AirPurifier = 0x08,
    }
);

byte_enum!(
    /// Ventilator speed.
    FanSpeed, "fan_speed" {
        Off = 0x00,
        Low = 0x40,
        Medium = 0x80,
        High = 0xc0,
    }
);

byte_enum!(
    /// Elevator travel direction.
    Direction, "direction" {
        Idle = 0x00,
        Down = 0x01,
        Up = 0x02,
        Arrival = 0x03,
    }
);
