mod binary_sensor;
mod client;
mod climate;
mod config;
mod connection;
mod dispatcher;
mod entity;
mod entry;
mod gateway;
#[allow(clippy::module_inception)]
mod kocom;
mod light;
mod platform;
mod restore;

pub use config::KocomConfig;
pub use kocom::CommandError;
pub use kocom::KocomIntegration;
use linkme::distributed_slice;

use crate::engine;

pub const DOMAIN: &str = "kocom_wallpad";
pub const DEFAULT_PORT: u16 = 8899;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_kocom(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let kocom_config = if let Some(c) = &ctx.config.integrations.kocom {
        c
    } else {
        return Ok(None);
    };

    anyhow::ensure!(
        !kocom_config.host.trim().is_empty(),
        "Kocom bridge host must not be empty"
    );
    Ok(Some(Box::new(KocomIntegration::new(kocom_config))))
}
