use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

pub const POWER: &str = "power";
pub const BRIGHTNESS: &str = "brightness";
pub const LEVEL: &str = "level";
pub const AWAY_MODE: &str = "away_mode";
pub const TARGET_TEMP: &str = "target_temp";
pub const CURRENT_TEMP: &str = "current_temp";
pub const STATE: &str = "state";
pub const ERROR_CODE: &str = "error_code";
pub const OP_MODE: &str = "op_mode";
pub const FAN_MODE: &str = "fan_mode";
pub const VENT_MODE: &str = "vent_mode";
pub const FAN_SPEED: &str = "fan_speed";
pub const TIME: &str = "time";

// Sub-device identifiers.
pub const ERROR: &str = "error";
pub const HOTWATER_TEMPERATURE: &str = "hotwater temperature";
pub const HEATWATER_TEMPERATURE: &str = "heatwater temperature";
pub const CO2: &str = "co2";
pub const PM10: &str = "pm10";
pub const PM25: &str = "pm25";
pub const VOC: &str = "voc";
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const DIRECTION: &str = "direction";
pub const FLOOR: &str = "floor";

/// A single decoded state value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Levels(Vec<u8>),
    Time(Option<DateTime<Utc>>),
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for StateValue {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<u16> for StateValue {
    fn from(value: u16) -> Self {
        Self::Int(value.into())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Option<DateTime<Utc>>> for StateValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        Self::Time(value)
    }
}

pub type DeviceState = BTreeMap<String, StateValue>;

/// Snapshot of one logical device decoded from a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub device_type: String,
    pub room_id: Option<String>,
    pub sub_id: Option<String>,
    pub state: DeviceState,
}

impl Device {
    pub fn new(device_type: impl Into<String>, room_id: Option<String>) -> Self {
        Self {
            device_type: device_type.into(),
            room_id,
            sub_id: None,
            state: DeviceState::new(),
        }
    }

    pub fn with_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.state.insert(key.to_string(), value.into());
        self
    }

    /// Identity of the physical endpoint, e.g. `thermostat_1_error`.
    pub fn device_id(&self) -> String {
        create_dev_id(
            &self.device_type,
            self.room_id.as_deref(),
            self.sub_id.as_deref(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_id())
    }
}

/// Join the identity triple with `_`, skipping empty parts.
pub fn create_dev_id(device_type: &str, room_id: Option<&str>, sub_id: Option<&str>) -> String {
    [Some(device_type), room_id, sub_id]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dev_id_skips_missing_parts() {
        assert_eq!(create_dev_id("light", Some("1"), Some("0")), "light_1_0");
        assert_eq!(create_dev_id("gas", Some("0"), None), "gas_0");
        assert_eq!(create_dev_id("iaq", None, Some("co2")), "iaq_co2");
        assert_eq!(create_dev_id("fan", Some(""), Some("error")), "fan_error");
    }

    #[test]
    fn test_device_builder() {
        let device = Device::new("thermostat", Some("2".to_string()))
            .with_sub_id(ERROR)
            .with(STATE, true)
            .with(ERROR_CODE, "03");

        assert_eq!(device.device_id(), "thermostat_2_error");
        assert_eq!(device.get(STATE).and_then(StateValue::as_bool), Some(true));
        assert_eq!(device.get(ERROR_CODE).and_then(StateValue::as_str), Some("03"));
        assert_eq!(device.get(TIME), None);
    }

    #[test]
    fn test_state_value_serializes_untagged() {
        let device = Device::new("motion", Some("0".to_string()))
            .with(STATE, false)
            .with(TIME, None::<DateTime<Utc>>);

        insta::assert_snapshot!(
            serde_json::to_string(&device.state).unwrap(),
            @r#"{"state":false,"time":null}"#
        );
    }
}
