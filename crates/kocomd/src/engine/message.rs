//! Type-safe message system for kocomd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use serde::Deserialize;
use serde::Serialize;

use super::entity::SharedEntity;
use super::state::BinarySensorState;
use super::state::ClimateState;
use super::state::FanMode;
use super::state::HvacMode;
use super::state::LightState;
use super::state::PresetMode;

/// Messages FROM integrations TO the engine (events/state updates)
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        entity: SharedEntity,
        integration_name: String,
    },

    /// An entity was removed (integration unloaded, etc.)
    EntityRemoved { entity_id: String },

    /// A light's state changed
    LightStateChanged {
        entity_id: String,
        state: LightState,
    },

    /// A binary sensor's state changed (e.g., motion detected)
    BinarySensorStateChanged {
        entity_id: String,
        state: BinarySensorState,
    },

    /// A climate entity's state changed
    ClimateStateChanged {
        entity_id: String,
        state: ClimateState,
    },
}

impl std::fmt::Debug for FromIntegrationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                ..
            } => f
                .debug_struct("EntityDiscovered")
                .field("entity_id", entity_id)
                .field("integration_name", integration_name)
                .field("entity", &"<entity>")
                .finish(),
            FromIntegrationMessage::EntityRemoved { entity_id } => f
                .debug_struct("EntityRemoved")
                .field("entity_id", entity_id)
                .finish(),
            FromIntegrationMessage::LightStateChanged { entity_id, state } => f
                .debug_struct("LightStateChanged")
                .field("entity_id", entity_id)
                .field("state", state)
                .finish(),
            FromIntegrationMessage::BinarySensorStateChanged { entity_id, state } => f
                .debug_struct("BinarySensorStateChanged")
                .field("entity_id", entity_id)
                .field("state", state)
                .finish(),
            FromIntegrationMessage::ClimateStateChanged { entity_id, state } => f
                .debug_struct("ClimateStateChanged")
                .field("entity_id", entity_id)
                .field("state", state)
                .finish(),
        }
    }
}

/// A change requested of a climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClimateAction {
    SetHvacMode { hvac_mode: HvacMode },
    SetPresetMode { preset_mode: PresetMode },
    /// Degrees Celsius
    SetTemperature { temperature: u8 },
    SetFanMode { fan_mode: FanMode },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Ask the device behind an entity to report its current state
    Refresh { entity_id: String },

    /// Command to change a light's state
    LightCommand {
        entity_id: String,
        on: bool,
        brightness: Option<u8>,
    },

    /// Command to change a climate entity's settings
    ClimateCommand {
        entity_id: String,
        action: ClimateAction,
    },
}

impl ToIntegrationMessage {
    /// Entity the command is addressed to, used for routing.
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::Refresh { entity_id }
            | ToIntegrationMessage::LightCommand { entity_id, .. }
            | ToIntegrationMessage::ClimateCommand { entity_id, .. } => entity_id,
        }
    }
}
