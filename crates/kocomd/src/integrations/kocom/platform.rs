//! Wiring shared by every entity platform.
//!
//! A platform sees each known packet of its kind once at setup and every
//! packet discovered later through the gateway's add signal. Registered
//! entities then follow their device and the bus connection until the entry
//! is unloaded.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use wallpad::Device;
use wallpad::KocomPacket;

use super::entity::KocomEntity;
use super::entry::KocomEntry;
use super::gateway::add_signal;
use super::gateway::connection_signal;
use crate::engine::lock;
use crate::engine::AddEntities;
use crate::engine::Entity;
use crate::engine::Platform;
use crate::engine::SharedEntity;
use crate::engine::StateWriter;

/// An engine entity built on a [`KocomEntity`].
pub trait PlatformEntity: Entity + Sized + 'static {
    fn base(&self) -> &KocomEntity;

    fn base_mut(&mut self) -> &mut KocomEntity;

    /// Recompute derived values after the device snapshot changed.
    fn device_updated(&mut self) {}

    /// Push the current state to the engine.
    fn write_state(&self, writer: &StateWriter);
}

/// Hand every known packet of `platform` to `add_entity`, then keep doing so
/// for packets discovered later.
pub fn setup_platform<F>(entry: &Arc<KocomEntry>, platform: Platform, add_entity: F)
where
    F: Fn(&KocomEntry, &KocomPacket) + Send + Sync + 'static,
{
    let weak = Arc::downgrade(entry);
    let handler = move |packet: &KocomPacket| {
        let Some(entry) = weak.upgrade() else {
            return;
        };
        add_entity(entry.as_ref(), packet);
    };

    let known = entry.gateway().get_entities(platform);
    debug!("Setting up {} known {} entities", known.len(), platform);
    for packet in &known {
        handler(packet);
    }

    let subscription = entry
        .gateway()
        .packets()
        .connect(add_signal(platform), handler);
    entry.on_unload(subscription);
}

/// Offer `entity` to the engine and keep its state current.
///
/// An entity already tracked by the entry is offered again but not wired a
/// second time; the engine keeps the first one.
pub fn register<E: PlatformEntity>(
    entry: &KocomEntry,
    add: &AddEntities,
    writer: &StateWriter,
    entity: E,
) {
    let entity_id = entity.base().entity_id().to_string();
    let signal = entity.base().update_signal();
    let is_new = entry.track(&entity_id, entity.platform(), entity.base().dev_id());

    let entity = Arc::new(Mutex::new(entity));
    let shared: SharedEntity = entity.clone();
    add.add(vec![shared]);
    if !is_new {
        debug!("{} is already tracked", entity_id);
        return;
    }
    lock(&entity).write_state(writer);

    let on_update = {
        let entity = entity.clone();
        let writer = writer.clone();
        entry
            .gateway()
            .devices()
            .connect(signal, move |device: &Device| {
                let mut entity = lock(&entity);
                if !entity.base_mut().handle_device_update(device) {
                    return;
                }
                entity.device_updated();
                entity.write_state(&writer);
            })
    };
    entry.on_unload(on_update);

    let writer = writer.clone();
    let on_connection = entry.gateway().connection().connect(
        connection_signal(entry.gateway().host()),
        move |_: &bool| lock(&entity).write_state(&writer),
    );
    entry.on_unload(on_connection);
}
