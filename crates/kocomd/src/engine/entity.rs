//! Entity abstraction for kocomd
//!
//! Everything an integration exposes to the engine implements [`Entity`].

use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;

use super::device::DeviceInfo;

/// Entity handle shared between the owning integration and the engine.
pub type SharedEntity = Arc<Mutex<dyn Entity>>;

/// Platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Climate,
    Fan,
    Light,
    Sensor,
    Switch,
}

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Engine-wide identifier, e.g. `binary_sensor.kocom_fan_0_error`
    fn entity_id(&self) -> &str;

    /// Identifier that stays stable across restarts and hosts
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn platform(&self) -> Platform;

    /// Serialize current state to JSON for the API
    fn state_json(&self) -> serde_json::Value;

    fn available(&self) -> bool {
        true
    }

    /// Physical device this entity belongs to, if any.
    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }
}
