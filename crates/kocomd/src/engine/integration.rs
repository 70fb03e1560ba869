use std::error::Error;

use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::warn;

use super::entity::SharedEntity;
use super::lock;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::BinarySensorState;
use super::state::ClimateState;
use super::state::LightState;
use crate::config::Config;

/// Channel types for messages FROM integrations TO the engine
/// These are bounded channels to provide backpressure
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Channel types for messages FROM the engine TO integrations (unbounded - engine must not block)
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// Result type for integration factory functions
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

pub struct IntegrationContext<'a> {
    pub config: &'a Config,
}

#[distributed_slice]
pub static REGISTRY: [fn(&IntegrationContext) -> IntegrationFactoryResult];

/// Integration trait that all integrations must implement
#[async_trait]
pub trait Integration: Send + Sync {
    /// Get the name/identifier of this integration
    fn name(&self) -> &str;

    /// Set up the integration - connect, register platforms, etc.
    ///
    /// The integration receives a sender to report events back to the engine
    /// (discovery, state changes, etc.)
    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>>;

    /// Handle a command from the engine
    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Shut down the integration gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// Batch-add callback handed to platform setup.
///
/// Called from synchronous dispatch handlers, so it never waits on the
/// engine: a full channel drops the batch with a warning.
#[derive(Clone)]
pub struct AddEntities {
    integration_name: String,
    tx: FromIntegrationSender,
}

impl AddEntities {
    pub fn new(integration_name: impl Into<String>, tx: FromIntegrationSender) -> Self {
        Self {
            integration_name: integration_name.into(),
            tx,
        }
    }

    pub fn add(&self, entities: Vec<SharedEntity>) {
        for entity in entities {
            let entity_id = lock(&entity).entity_id().to_string();
            let msg = FromIntegrationMessage::EntityDiscovered {
                entity_id: entity_id.clone(),
                entity,
                integration_name: self.integration_name.clone(),
            };
            match self.tx.try_send(msg) {
                Ok(()) => debug!("Queued entity {} for registration", entity_id),
                Err(TrySendError::Full(_)) => {
                    warn!("Engine queue full, dropping entity {}", entity_id)
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Engine stopped, dropping entity {}", entity_id)
                }
            }
        }
    }
}

/// Pushes entity state to the engine.
#[derive(Clone)]
pub struct StateWriter {
    tx: FromIntegrationSender,
}

impl StateWriter {
    pub fn new(tx: FromIntegrationSender) -> Self {
        Self { tx }
    }

    pub fn write_light(&self, entity_id: &str, state: LightState) {
        self.write(
            entity_id,
            FromIntegrationMessage::LightStateChanged {
                entity_id: entity_id.to_string(),
                state,
            },
        );
    }

    pub fn write_binary_sensor(&self, entity_id: &str, state: BinarySensorState) {
        self.write(
            entity_id,
            FromIntegrationMessage::BinarySensorStateChanged {
                entity_id: entity_id.to_string(),
                state,
            },
        );
    }

    pub fn write_climate(&self, entity_id: &str, state: ClimateState) {
        self.write(
            entity_id,
            FromIntegrationMessage::ClimateStateChanged {
                entity_id: entity_id.to_string(),
                state,
            },
        );
    }

    fn write(&self, entity_id: &str, msg: FromIntegrationMessage) {
        if let Err(e) = self.tx.try_send(msg) {
            warn!("Failed to write state of {}: {}", entity_id, e);
        }
    }

    pub fn remove(&self, entity_id: &str) {
        let msg = FromIntegrationMessage::EntityRemoved {
            entity_id: entity_id.to_string(),
        };
        if let Err(e) = self.tx.try_send(msg) {
            warn!("Failed to remove {}: {}", entity_id, e);
        }
    }
}
