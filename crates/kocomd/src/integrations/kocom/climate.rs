//! Climate platform: floor heating thermostats and air conditioners.

use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::warn;
use wallpad::device::AWAY_MODE;
use wallpad::device::CURRENT_TEMP;
use wallpad::device::FAN_MODE;
use wallpad::device::OP_MODE;
use wallpad::device::POWER;
use wallpad::device::TARGET_TEMP;
use wallpad::enums::OpMode;
use wallpad::KocomPacket;
use wallpad::PacketKind;

use super::entity::KocomEntity;
use super::entry::KocomEntry;
use super::gateway::Gateway;
use super::platform::register;
use super::platform::setup_platform;
use super::platform::PlatformEntity;
use crate::engine::AddEntities;
use crate::engine::ClimateAction;
use crate::engine::ClimateState;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::FanMode;
use crate::engine::HvacMode;
use crate::engine::Platform;
use crate::engine::PresetMode;
use crate::engine::StateWriter;

const THERMOSTAT_MODES: [HvacMode; 2] = [HvacMode::Off, HvacMode::Heat];
const AC_MODES: [HvacMode; 5] = [
    HvacMode::Off,
    HvacMode::Cool,
    HvacMode::FanOnly,
    HvacMode::Dry,
    HvacMode::Auto,
];

/// Target temperatures the device accepts, in degrees Celsius.
fn temperature_range(kind: PacketKind) -> RangeInclusive<u8> {
    match kind {
        PacketKind::Ac => 18..=30,
        _ => 5..=40,
    }
}

fn hvac_modes(kind: PacketKind) -> &'static [HvacMode] {
    match kind {
        PacketKind::Ac => &AC_MODES,
        _ => &THERMOSTAT_MODES,
    }
}

fn is_climate(kind: PacketKind) -> bool {
    matches!(kind, PacketKind::Thermostat | PacketKind::Ac)
}

pub struct KocomClimate {
    base: KocomEntity,
    kind: PacketKind,
}

impl KocomClimate {
    pub fn new(gateway: &Gateway, packet: &KocomPacket) -> Self {
        Self {
            base: KocomEntity::new(gateway, Platform::Climate, packet),
            kind: packet.kind(),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.base
            .device()
            .get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.base.device().get(key).and_then(|value| value.as_str())
    }

    fn temperature(&self, key: &str) -> Option<i64> {
        self.base.device().get(key).and_then(|value| value.as_int())
    }

    pub fn hvac_mode(&self) -> HvacMode {
        if !self.flag(POWER) {
            return HvacMode::Off;
        }
        match self.kind {
            PacketKind::Ac => self
                .text(OP_MODE)
                .and_then(|mode| mode.parse().ok())
                .unwrap_or(HvacMode::Off),
            _ => HvacMode::Heat,
        }
    }

    pub fn state(&self) -> ClimateState {
        let temperatures = temperature_range(self.kind);
        let (preset_mode, fan_mode) = match self.kind {
            PacketKind::Ac => (
                None,
                self.text(FAN_MODE).and_then(|mode| mode.parse().ok()),
            ),
            _ => {
                let preset = if self.flag(AWAY_MODE) {
                    PresetMode::Away
                } else {
                    PresetMode::None
                };
                (Some(preset), None)
            }
        };

        ClimateState {
            hvac_mode: self.hvac_mode(),
            hvac_modes: hvac_modes(self.kind).to_vec(),
            preset_mode,
            fan_mode,
            current_temperature: self.temperature(CURRENT_TEMP),
            target_temperature: self.temperature(TARGET_TEMP),
            min_temp: *temperatures.start(),
            max_temp: *temperatures.end(),
            available: self.base.available(),
            attributes: self.base.base_attributes(),
        }
    }
}

impl Entity for KocomClimate {
    fn entity_id(&self) -> &str {
        self.base.entity_id()
    }

    fn unique_id(&self) -> &str {
        self.base.unique_id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn platform(&self) -> Platform {
        Platform::Climate
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.state()).unwrap_or_default()
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.base.device_info())
    }
}

impl PlatformEntity for KocomClimate {
    fn base(&self) -> &KocomEntity {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KocomEntity {
        &mut self.base
    }

    fn write_state(&self, writer: &StateWriter) {
        writer.write_climate(self.base.entity_id(), self.state());
    }
}

fn op_mode(mode: HvacMode) -> Option<OpMode> {
    match mode {
        HvacMode::Cool => Some(OpMode::Cool),
        HvacMode::FanOnly => Some(OpMode::FanOnly),
        HvacMode::Dry => Some(OpMode::Dry),
        HvacMode::Auto => Some(OpMode::Auto),
        HvacMode::Off | HvacMode::Heat => None,
    }
}

fn bus_fan_mode(mode: FanMode) -> wallpad::enums::FanMode {
    match mode {
        FanMode::Low => wallpad::enums::FanMode::Low,
        FanMode::Medium => wallpad::enums::FanMode::Medium,
        FanMode::High => wallpad::enums::FanMode::High,
    }
}

/// Frame applying `action` to the climate device behind `packet`.
///
/// Returns `None` for actions the device does not support, including
/// temperatures outside its range.
pub fn command_frame(packet: &KocomPacket, action: ClimateAction) -> Option<Vec<u8>> {
    let kind = packet.kind();
    if !is_climate(kind) {
        return None;
    }
    match action {
        ClimateAction::SetHvacMode {
            hvac_mode: HvacMode::Off,
        } => packet.make_power(false),
        ClimateAction::SetHvacMode {
            hvac_mode: HvacMode::Heat,
        } if kind == PacketKind::Thermostat => packet.make_power(true),
        ClimateAction::SetHvacMode { hvac_mode } => packet.make_op_mode(op_mode(hvac_mode)?),
        ClimateAction::SetPresetMode { preset_mode } => {
            packet.make_away_mode(preset_mode == PresetMode::Away)
        }
        ClimateAction::SetTemperature { temperature } => {
            if !temperature_range(kind).contains(&temperature) {
                return None;
            }
            packet.make_target_temp(temperature)
        }
        ClimateAction::SetFanMode { fan_mode } => packet.make_fan_mode(bus_fan_mode(fan_mode)),
    }
}

/// Register climate entities for every known packet and for those
/// discovered later.
pub fn setup_entry(entry: &Arc<KocomEntry>, add: AddEntities, writer: StateWriter) {
    setup_platform(entry, Platform::Climate, move |entry, packet| {
        if is_climate(packet.kind()) {
            register(entry, &add, &writer, KocomClimate::new(entry.gateway(), packet));
        } else {
            warn!("Unsupported climate packet: {}", packet);
        }
    });
}
