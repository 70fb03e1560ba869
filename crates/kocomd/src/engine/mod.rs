mod device;
#[allow(clippy::module_inception)]
mod engine;
mod entity;
mod event;
mod integration;
mod message;
pub mod state;

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub use device::Device;
pub use device::DeviceInfo;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::EntityEntry;
pub use entity::Entity;
pub use entity::Platform;
pub use entity::SharedEntity;
pub use event::Event;
pub use integration::AddEntities;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::StateWriter;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::ClimateAction;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::Attributes;
pub use state::BinarySensorState;
pub use state::ClimateState;
pub use state::FanMode;
pub use state::HvacMode;
pub use state::LightState;
pub use state::PresetMode;
pub use state::State;

/// Lock a std mutex, carrying on with the data if a holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
