use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_port() -> u16 {
    super::DEFAULT_PORT
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1200
}

fn default_send_interval_ms() -> u64 {
    100
}

/// Configuration for the Kocom wallpad integration
#[derive(Debug, Clone, Deserialize)]
pub struct KocomConfig {
    /// Host of the RS485-to-TCP bridge
    pub host: String,

    /// Bridge port (default: 8899)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Attempts per queued frame before it is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between send attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pause after each frame written to the bus
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// JSON file keeping the last frame of every device across restarts
    #[serde(default)]
    pub restore_path: Option<PathBuf>,
}

impl KocomConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            send_interval_ms: default_send_interval_ms(),
            restore_path: None,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}
