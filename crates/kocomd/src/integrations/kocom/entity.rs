//! Identity and availability shared by every Kocom entity.

use serde_json::json;
use tokio::sync::watch;
use wallpad::Device;
use wallpad::KocomPacket;

use super::gateway::device_update_signal;
use super::gateway::Gateway;
use super::DOMAIN;
use crate::engine::Attributes;
use crate::engine::DeviceInfo;
use crate::engine::Platform;

const BRAND_NAME: &str = "kocom";
const MANUFACTURER: &str = "KOCOM Co., Ltd";
const MODEL: &str = "Smart Wallpad";
const SW_VERSION: &str = "1.0.2";

pub const DEVICE_TYPE: &str = "device_type";
pub const ROOM_ID: &str = "room_id";
pub const SUB_ID: &str = "sub_id";

pub struct KocomEntity {
    host: String,
    dev_id: String,
    entity_id: String,
    unique_id: String,
    name: String,
    device: Device,
    status: watch::Receiver<bool>,
}

impl KocomEntity {
    pub fn new(gateway: &Gateway, platform: Platform, packet: &KocomPacket) -> Self {
        let dev_id = packet.device_id();
        Self {
            host: gateway.host().to_string(),
            entity_id: format!("{platform}.{BRAND_NAME}_{}", dev_id.replace(' ', "_")),
            unique_id: format!("{BRAND_NAME}_{dev_id}-{}", gateway.host()),
            name: format!("Kocom {}", title_case(&dev_id.replace('_', " "))),
            dev_id,
            device: packet.device().clone(),
            status: gateway.status(),
        }
    }

    pub fn dev_id(&self) -> &str {
        &self.dev_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Entities are available while the bus connection is up.
    pub fn available(&self) -> bool {
        *self.status.borrow()
    }

    pub fn update_signal(&self) -> String {
        device_update_signal(&self.host, &self.dev_id)
    }

    pub fn device_info(&self) -> DeviceInfo {
        let device_type = &self.device.device_type;
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), format!("{}_{}", self.host, device_type))],
            name: format!("Kocom {device_type}"),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(MODEL.to_string()),
            sw_version: Some(SW_VERSION.to_string()),
            via_device: Some((DOMAIN.to_string(), self.host.clone())),
        }
    }

    /// Identity attributes every entity exposes.
    pub fn base_attributes(&self) -> Attributes {
        Attributes::from([
            (DEVICE_TYPE.to_string(), json!(self.device.device_type)),
            (ROOM_ID.to_string(), json!(self.device.room_id)),
            (SUB_ID.to_string(), json!(self.device.sub_id)),
        ])
    }

    /// Take a new snapshot. Returns `false` if the state did not change.
    pub fn handle_device_update(&mut self, device: &Device) -> bool {
        if self.device.state == device.state {
            return false;
        }
        self.device.state = device.state.clone();
        true
    }
}

/// Upper-case the first letter of every word, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
