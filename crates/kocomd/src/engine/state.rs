use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Free-form attributes exposed next to an entity's state.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// State of a light entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    /// Whether the light is on or off.
    pub on: bool,

    /// Dimmer level as reported by the bus, if supported.
    pub brightness: Option<u8>,

    /// Whether the device is currently reachable.
    pub available: bool,

    #[serde(default)]
    pub attributes: Attributes,
}

/// State of a binary sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinarySensorState {
    /// Whether the sensor is active (meaning depends on device class:
    /// motion detected, problem reported, etc.)
    pub on: bool,

    /// Device class, e.g. `motion` or `problem`.
    pub device_class: Option<String>,

    /// Whether the device is currently reachable.
    pub available: bool,

    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HvacMode {
    #[default]
    Off,
    Heat,
    Cool,
    FanOnly,
    Dry,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PresetMode {
    None,
    Away,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FanMode {
    Low,
    Medium,
    High,
}

/// State of a climate entity (floor heating or air conditioner).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClimateState {
    pub hvac_mode: HvacMode,

    /// Modes the device accepts.
    pub hvac_modes: Vec<HvacMode>,

    pub preset_mode: Option<PresetMode>,

    pub fan_mode: Option<FanMode>,

    /// Degrees Celsius.
    pub current_temperature: Option<i64>,
    pub target_temperature: Option<i64>,
    pub min_temp: u8,
    pub max_temp: u8,

    /// Whether the device is currently reachable.
    pub available: bool,

    #[serde(default)]
    pub attributes: Attributes,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub lights: BTreeMap<String, LightState>,
    pub binary_sensors: BTreeMap<String, BinarySensorState>,
    pub climates: BTreeMap<String, ClimateState>,
}
