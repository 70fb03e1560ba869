//! Light platform.
//!
//! Every light slot the bus has reported on becomes a light. Slots that have
//! shown dimmer levels also report and accept a brightness.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use wallpad::device::BRIGHTNESS;
use wallpad::device::LEVEL;
use wallpad::device::POWER;
use wallpad::KocomPacket;
use wallpad::PacketKind;

use super::entity::KocomEntity;
use super::entry::KocomEntry;
use super::gateway::Gateway;
use super::platform::register;
use super::platform::setup_platform;
use super::platform::PlatformEntity;
use crate::engine::AddEntities;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::LightState;
use crate::engine::Platform;
use crate::engine::StateWriter;

pub struct KocomLight {
    base: KocomEntity,
}

impl KocomLight {
    pub fn new(gateway: &Gateway, packet: &KocomPacket) -> Self {
        Self {
            base: KocomEntity::new(gateway, Platform::Light, packet),
        }
    }

    pub fn is_on(&self) -> bool {
        self.base
            .device()
            .get(POWER)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    /// Dimmer level, `None` until the slot has shown levels.
    pub fn brightness(&self) -> Option<u8> {
        let device = self.base.device();
        device.get(LEVEL)?;
        device
            .get(BRIGHTNESS)
            .and_then(|value| value.as_int())
            .and_then(|level| u8::try_from(level).ok())
    }

    pub fn state(&self) -> LightState {
        let mut attributes = self.base.base_attributes();
        if let Some(levels) = self.base.device().get(LEVEL) {
            attributes.insert(LEVEL.to_string(), json!(levels));
        }
        LightState {
            on: self.is_on(),
            brightness: self.brightness(),
            available: self.base.available(),
            attributes,
        }
    }
}

impl Entity for KocomLight {
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
        Platform::Light
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

impl PlatformEntity for KocomLight {
    fn base(&self) -> &KocomEntity {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KocomEntity {
        &mut self.base
    }

    fn write_state(&self, writer: &StateWriter) {
        writer.write_light(self.base.entity_id(), self.state());
    }
}

/// Frame switching the light behind `packet`.
///
/// A non-zero `brightness` on an `on` request sets that dimmer level instead.
pub fn command_frame(packet: &KocomPacket, on: bool, brightness: Option<u8>) -> Option<Vec<u8>> {
    if packet.kind() != PacketKind::Light {
        return None;
    }
    match brightness {
        Some(level) if on && level > 0 => packet.make_brightness(level),
        _ => packet.make_power(on),
    }
}

/// Register lights for every known packet and for those discovered later.
pub fn setup_entry(entry: &Arc<KocomEntry>, add: AddEntities, writer: StateWriter) {
    setup_platform(entry, Platform::Light, move |entry, packet| {
        if packet.kind() == PacketKind::Light {
            register(entry, &add, &writer, KocomLight::new(entry.gateway(), packet));
        } else {
            warn!("Unsupported light packet: {}", packet);
        }
    });
}
