use std::fmt;

use crate::checksum;
use crate::device::Device;
use crate::enums::Command;
use crate::enums::DeviceType;
use crate::enums::PacketType;
use crate::error::Error;
use crate::error::Result;

pub const FRAME_LEN: usize = 21;
pub const PREFIX: [u8; 2] = [0xaa, 0x55];
pub const SUFFIX: [u8; 2] = [0x0d, 0x0d];

/// Bus address of the wallpad itself.
pub const WALLPAD_ADDRESS: [u8; 2] = [0x01, 0x00];

/// A validated 21 byte bus frame.
///
/// ```text
/// aa 55 | 30 | type<<4|seq | 00 | dest[2] | src[2] | cmd | value[8] | sum | 0d 0d
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: [u8; FRAME_LEN],
    pub packet_type: PacketType,
    pub sequence: u8,
    pub dest: [u8; 2],
    pub src: [u8; 2],
    pub command: Command,
    pub value: [u8; 8],
}

impl Frame {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidLength(bytes.len()))?;

        if raw[..2] != PREFIX || raw[FRAME_LEN - 2..] != SUFFIX {
            return Err(Error::InvalidFraming);
        }

        let computed = checksum::checksum(&raw[2..18]);
        if computed != raw[18] {
            return Err(Error::Checksum {
                provided: raw[18],
                computed,
            });
        }

        let mut value = [0u8; 8];
        value.copy_from_slice(&raw[10..18]);

        Ok(Self {
            packet_type: PacketType::try_from(raw[3] >> 4)?,
            sequence: raw[3] & 0x0f,
            dest: [raw[5], raw[6]],
            src: [raw[7], raw[8]],
            command: Command::try_from(raw[9])?,
            value,
            raw,
        })
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::parse(&decode_hex(hex)?)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn checksum(&self) -> u8 {
        self.raw[18]
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.raw)
    }

    /// Address of the device this frame concerns. Frames sent by the wallpad
    /// are addressed to the device, replies come from it.
    pub fn address(&self) -> [u8; 2] {
        if self.src[0] == DeviceType::Wallpad.code() {
            self.dest
        } else {
            self.src
        }
    }

    pub fn device_type(&self) -> Result<DeviceType> {
        DeviceType::try_from(self.address()[0])
    }

    pub fn room_id(&self) -> String {
        self.address()[1].to_string()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame(type={}, seq={:#x}, dest={:02x}{:02x}, src={:02x}{:02x}, cmd={}, value={}, sum={:#04x})",
            self.packet_type,
            self.sequence,
            self.dest[0],
            self.dest[1],
            self.src[0],
            self.src[1],
            self.command,
            encode_hex(&self.value),
            self.checksum(),
        )
    }
}

/// Lowercase hex without separators, the format frames are logged and stored in.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(Error::InvalidHex(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::InvalidHex(hex.to_string()))
}

/// Device category of a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PacketKind {
    Light,
    Outlet,
    Thermostat,
    Ac,
    Fan,
    Iaq,
    Gas,
    Motion,
    Ev,
}

impl PacketKind {
    pub fn from_device_type(device_type: DeviceType) -> Option<Self> {
        Some(match device_type {
            DeviceType::Light => Self::Light,
            DeviceType::Outlet => Self::Outlet,
            DeviceType::Thermostat => Self::Thermostat,
            DeviceType::Ac => Self::Ac,
            DeviceType::Fan => Self::Fan,
            DeviceType::Iaq => Self::Iaq,
            DeviceType::Gas => Self::Gas,
            DeviceType::Motion => Self::Motion,
            DeviceType::Ev => Self::Ev,
            DeviceType::Wallpad | DeviceType::Doorlock | DeviceType::Ignore => return None,
        })
    }

    pub fn device_type(self) -> DeviceType {
        match self {
            Self::Light => DeviceType::Light,
            Self::Outlet => DeviceType::Outlet,
            Self::Thermostat => DeviceType::Thermostat,
            Self::Ac => DeviceType::Ac,
            Self::Fan => DeviceType::Fan,
            Self::Iaq => DeviceType::Iaq,
            Self::Gas => DeviceType::Gas,
            Self::Motion => DeviceType::Motion,
            Self::Ev => DeviceType::Ev,
        }
    }
}

/// One logical device decoded from a frame.
///
/// A single frame can describe several devices (eight light slots, a
/// thermostat and its error flag, ...); each gets its own packet sharing the
/// same frame.
#[derive(Debug, Clone, PartialEq)]
pub struct KocomPacket {
    kind: PacketKind,
    frame: Frame,
    device: Device,
}

impl KocomPacket {
    pub fn new(kind: PacketKind, frame: Frame, device: Device) -> Self {
        Self {
            kind,
            frame,
            device,
        }
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_id(&self) -> String {
        self.device.device_id()
    }
}

impl fmt::Display for KocomPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Packet(device={}, state={:?}, frame={})",
            self.kind,
            self.device,
            self.device.state,
            self.frame.to_hex()
        )
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::command::frame;

    #[test]
    fn test_parse_header() {
        let raw = frame(&hex!("30dc 00 0100 3601 00 1100161800140000"));
        let frame = Frame::parse(&raw).unwrap();

        assert_eq!(frame.packet_type, PacketType::Recv);
        assert_eq!(frame.sequence, 0x0c);
        assert_eq!(frame.dest, WALLPAD_ADDRESS);
        assert_eq!(frame.src, [0x36, 0x01]);
        assert_eq!(frame.command, Command::Status);
        assert_eq!(frame.device_type().unwrap(), DeviceType::Thermostat);
        assert_eq!(frame.room_id(), "1");
    }

    #[test]
    fn test_address_uses_destination_for_wallpad_frames() {
        let raw = frame(&hex!("30bc 00 0e02 0100 3a 0000000000000000"));
        let frame = Frame::parse(&raw).unwrap();

        assert_eq!(frame.packet_type, PacketType::Send);
        assert_eq!(frame.address(), [0x0e, 0x02]);
        assert_eq!(frame.device_type().unwrap(), DeviceType::Light);
        assert_eq!(frame.room_id(), "2");
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        let good = frame(&hex!("30dc 00 0100 6000 04 0000000000000000"));

        assert!(matches!(
            Frame::parse(&good[..20]),
            Err(Error::InvalidLength(20))
        ));

        let mut bad_sum = good.clone();
        bad_sum[18] ^= 0xff;
        assert!(matches!(
            Frame::parse(&bad_sum),
            Err(Error::Checksum { .. })
        ));

        let mut bad_prefix = good.clone();
        bad_prefix[0] = 0x00;
        assert!(matches!(
            Frame::parse(&bad_prefix),
            Err(Error::InvalidFraming)
        ));
    }

    #[test]
    fn test_hex_round_trip() {
        let raw = frame(&hex!("30dc 00 0100 6000 04 0000000000000000"));
        let frame = Frame::parse(&raw).unwrap();
        let hex = frame.to_hex();

        assert_eq!(hex.len(), FRAME_LEN * 2);
        assert!(hex.starts_with("aa5530dc"));
        assert_eq!(Frame::from_hex(&hex).unwrap(), frame);
        assert!(matches!(
            Frame::from_hex("aa5"),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn test_display() {
        let raw = frame(&hex!("30dc 00 0100 6000 04 0000000000000000"));
        let frame = Frame::parse(&raw).unwrap();
        insta::assert_snapshot!(
            frame.to_string(),
            @"Frame(type=recv, seq=0xc, dest=0100, src=6000, cmd=detect, value=0000000000000000, sum=0x71)"
        );
    }
}
