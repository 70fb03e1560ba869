use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::binary_sensor;
use super::climate;
use super::entry::KocomEntry;
use super::gateway::Gateway;
use super::light;
use super::restore;
use super::KocomConfig;
use crate::engine::AddEntities;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::Platform;
use crate::engine::StateWriter;
use crate::engine::ToIntegrationMessage;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No Kocom device behind {0}")]
    UnknownEntity(String),

    #[error("{entity_id} cannot apply {request}")]
    Unsupported { entity_id: String, request: String },
}

/// Kocom wallpad integration for kocomd
///
/// Talks to the wallpad's RS485 bus through a TCP serial bridge. Lights and
/// climate devices accept commands; error flags and motion detectors are
/// exposed as binary sensors.
pub struct KocomIntegration {
    config: KocomConfig,
    gateway: Arc<Gateway>,
    entry: Option<Arc<KocomEntry>>,
    writer: Option<StateWriter>,
}

impl KocomIntegration {
    pub fn new(config: &KocomConfig) -> Self {
        Self {
            config: config.clone(),
            gateway: Arc::new(Gateway::new(config)),
            entry: None,
            writer: None,
        }
    }

    fn restore(&self) {
        let Some(path) = &self.config.restore_path else {
            return;
        };
        match restore::load(path) {
            Ok(records) => self.gateway.restore(&records),
            Err(e) => warn!("Ignoring saved frames: {}", e),
        }
    }

    fn handle_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let Some(entry) = &self.entry else {
            return Err(CommandError::UnknownEntity(msg.entity_id().to_string()));
        };
        if !self.gateway.is_connected() {
            warn!("Bridge offline, command for {} waits for reconnect", msg.entity_id());
        }

        match msg {
            ToIntegrationMessage::Refresh { entity_id } => {
                info!("Handling refresh for {}", entity_id);
                if !entry.refresh(&entity_id) {
                    return Err(CommandError::UnknownEntity(entity_id));
                }
            }
            ToIntegrationMessage::LightCommand {
                entity_id,
                on,
                brightness,
            } => {
                info!(
                    "Handling light command for {}: on={}, brightness={:?}",
                    entity_id, on, brightness
                );
                let packet = entry
                    .packet(&entity_id, Platform::Light)
                    .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;
                let frame = light::command_frame(&packet, on, brightness).ok_or_else(|| {
                    CommandError::Unsupported {
                        entity_id: entity_id.clone(),
                        request: format!("on={on}, brightness={brightness:?}"),
                    }
                })?;
                self.gateway.send(frame);
            }
            ToIntegrationMessage::ClimateCommand { entity_id, action } => {
                info!("Handling climate command for {}: {:?}", entity_id, action);
                let packet = entry
                    .packet(&entity_id, Platform::Climate)
                    .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;
                let frame = climate::command_frame(&packet, action).ok_or_else(|| {
                    CommandError::Unsupported {
                        entity_id: entity_id.clone(),
                        request: format!("{action:?}"),
                    }
                })?;
                self.gateway.send(frame);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Integration for KocomIntegration {
    fn name(&self) -> &str {
        "kocom"
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!(
            "Setting up Kocom wallpad at {}:{}",
            self.config.host, self.config.port
        );
        self.restore();

        // Platforms hook onto the gateway before the first live frame arrives.
        let entry = Arc::new(KocomEntry::new(self.gateway.clone()));
        let writer = StateWriter::new(tx.clone());
        let add = AddEntities::new(self.name(), tx);
        binary_sensor::setup_entry(&entry, add.clone(), writer.clone());
        light::setup_entry(&entry, add.clone(), writer.clone());
        climate::setup_entry(&entry, add, writer.clone());
        self.entry = Some(entry);
        self.writer = Some(writer);

        self.gateway.start();
        info!("Kocom integration ready to handle commands");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.handle_command(msg)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Kocom integration shutting down");
        if let Some(entry) = self.entry.take() {
            entry.unload();
            if let Some(writer) = &self.writer {
                for entity_id in entry.entity_ids() {
                    writer.remove(&entity_id);
                }
            }
        }
        self.gateway.stop().await;

        if let Some(path) = &self.config.restore_path {
            restore::save(path, &self.gateway.records())
                .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
            info!("Saved last frames to {}", path.display());
        }
        Ok(())
    }
}
