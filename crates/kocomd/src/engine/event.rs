use serde::Serialize;

use super::entity::Platform;
use super::state::BinarySensorState;
use super::state::ClimateState;
use super::state::LightState;

/// Engine-level events, broadcast to anyone subscribed through
/// [`super::Engine::subscribe`] and streamed on `GET /v1/events`.
///
/// Distinct from `FromIntegrationMessage` (transport-level). The engine converts
/// `FromIntegrationMessage` into `Event` at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    EntityAdded {
        entity_id: String,
        platform: Platform,
    },
    EntityRemoved {
        entity_id: String,
    },
    LightStateChanged {
        entity_id: String,
        state: LightState,
    },
    BinarySensorStateChanged {
        entity_id: String,
        state: BinarySensorState,
    },
    ClimateStateChanged {
        entity_id: String,
        state: ClimateState,
    },
}
