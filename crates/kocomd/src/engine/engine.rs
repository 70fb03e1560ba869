use std::collections::BTreeMap;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::entity::Platform;
use super::entity::SharedEntity;
use super::event::Event;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::ToIntegrationSender;
use super::lock;
use super::message::ClimateAction;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Capacity of the event broadcast; slow subscribers see `Lagged`.
const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No integration found for entity: {0}")]
    EntityNotFound(String),

    #[error("Integration channel not found: {0}")]
    IntegrationNotFound(String),

    #[error("Integration {0} is no longer running")]
    IntegrationStopped(String),
}

struct RegisteredEntity {
    entity: SharedEntity,
    integration_name: String,
    platform: Platform,
}

/// Point-in-time view of a registered entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityEntry {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub platform: Platform,
    pub integration: String,
    pub available: bool,
    pub state: serde_json::Value,
}

/// kocomd engine
///
/// This structure handles the flow of events, keeps the entity and device
/// registries, routes commands to the correct integration, and maintains a
/// view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Registered entities by entity_id, one per id
    entities: std::sync::Mutex<BTreeMap<String, RegisteredEntity>>,

    /// Devices by registry id
    devices: std::sync::Mutex<BTreeMap<String, Device>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    events: broadcast::Sender<Event>,

    /// Handles for integration tasks
    integration_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entities: std::sync::Mutex::new(BTreeMap::new()),
            devices: std::sync::Mutex::new(BTreeMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            events,
            integration_handles: Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Every registered factory is offered the config; factories return
    /// `None` when their section is absent.
    pub async fn register_integrations_from_config(&self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration).await;
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub async fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        lock(&self.integration_channels).insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            info!("Setting up integration '{}'", name);
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands until the engine drops our channel
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.lock().await.push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the integration that owns the entity.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), EngineError> {
        let entity_id = msg.entity_id();

        let integration_name = lock(&self.entities)
            .get(entity_id)
            .map(|registered| registered.integration_name.clone())
            .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))?;

        let channels = lock(&self.integration_channels);
        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| EngineError::IntegrationNotFound(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| EngineError::IntegrationStopped(integration_name))
    }

    /// Send a light command to control a light entity
    pub fn send_light_command(
        &self,
        entity_id: String,
        on: bool,
        brightness: Option<u8>,
    ) -> Result<(), EngineError> {
        self.send_command(ToIntegrationMessage::LightCommand {
            entity_id,
            on,
            brightness,
        })
    }

    /// Send a climate command to control a thermostat or air conditioner
    pub fn send_climate_command(
        &self,
        entity_id: String,
        action: ClimateAction,
    ) -> Result<(), EngineError> {
        self.send_command(ToIntegrationMessage::ClimateCommand { entity_id, action })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Stop all integrations and wait for their shutdown hooks to finish.
    pub async fn shutdown(&self) {
        info!("Stopping integrations");
        // Dropping the command channels ends each integration's message loop.
        lock(&self.integration_channels).clear();

        let handles = std::mem::take(&mut *self.integration_handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task failed: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Receive every engine event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn entities(&self) -> Vec<EntityEntry> {
        lock(&self.entities)
            .iter()
            .map(|(entity_id, registered)| {
                let entity = lock(&registered.entity);
                EntityEntry {
                    entity_id: entity_id.clone(),
                    unique_id: entity.unique_id().to_string(),
                    name: entity.name().to_string(),
                    platform: registered.platform,
                    integration: registered.integration_name.clone(),
                    available: entity.available(),
                    state: entity.state_json(),
                }
            })
            .collect()
    }

    pub fn devices(&self) -> Vec<Device> {
        lock(&self.devices).values().cloned().collect()
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                entity,
                integration_name,
            } => {
                let mut entities = lock(&self.entities);
                if entities.contains_key(&entity_id) {
                    debug!(
                        "Entity {} already registered, ignoring duplicate from {}",
                        entity_id, integration_name
                    );
                    return;
                }

                let (platform, device_info) = {
                    let entity = lock(&entity);
                    (entity.platform(), entity.device_info())
                };
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                if let Some(info) = device_info {
                    lock(&self.devices)
                        .entry(Device::registry_id(&info))
                        .or_insert_with(|| Device::new(info))
                        .add_entity(entity_id.clone());
                }

                entities.insert(
                    entity_id.clone(),
                    RegisteredEntity {
                        entity,
                        integration_name,
                        platform,
                    },
                );
                drop(entities);

                self.emit(Event::EntityAdded {
                    entity_id,
                    platform,
                });
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                if lock(&self.entities).remove(&entity_id).is_none() {
                    debug!("Removed entity {} was not registered", entity_id);
                }

                {
                    let mut state = State::clone(&self.state.load());
                    state.lights.remove(&entity_id);
                    state.binary_sensors.remove(&entity_id);
                    state.climates.remove(&entity_id);
                    self.state.store(Arc::new(state));
                }

                lock(&self.devices).retain(|_, device| {
                    device.remove_entity(&entity_id);
                    !device.entity_ids.is_empty()
                });

                self.emit(Event::EntityRemoved { entity_id });
            }
            FromIntegrationMessage::LightStateChanged { entity_id, state } => {
                info!(
                    "Light state changed: {} -> on={}, brightness={:?}",
                    entity_id, state.on, state.brightness
                );

                {
                    let mut snapshot = State::clone(&self.state.load());
                    snapshot.lights.insert(entity_id.clone(), state.clone());
                    self.state.store(Arc::new(snapshot));
                }

                self.emit(Event::LightStateChanged { entity_id, state });
            }
            FromIntegrationMessage::ClimateStateChanged { entity_id, state } => {
                info!(
                    "Climate state changed: {} -> {}, target={:?}",
                    entity_id, state.hvac_mode, state.target_temperature
                );

                {
                    let mut snapshot = State::clone(&self.state.load());
                    snapshot.climates.insert(entity_id.clone(), state.clone());
                    self.state.store(Arc::new(snapshot));
                }

                self.emit(Event::ClimateStateChanged { entity_id, state });
            }
            FromIntegrationMessage::BinarySensorStateChanged { entity_id, state } => {
                info!(
                    "Binary sensor state changed: {} -> on={}",
                    entity_id, state.on
                );

                {
                    let mut snapshot = State::clone(&self.state.load());
                    snapshot
                        .binary_sensors
                        .insert(entity_id.clone(), state.clone());
                    self.state.store(Arc::new(snapshot));
                }

                self.emit(Event::BinarySensorStateChanged { entity_id, state });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
