pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::BinarySensorState;
pub use engine::ClimateAction;
pub use engine::ClimateState;
pub use engine::Device;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::EntityEntry;
pub use engine::Event;
pub use engine::FanMode;
pub use engine::HvacMode;
pub use engine::LightState;
pub use engine::PresetMode;
pub use engine::State;
#[cfg(feature = "integration_kocom")]
pub use integrations::kocom::KocomConfig;
