use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::service::SessionConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Settings for the host binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// How often progress is polled while a conversion runs.
    #[serde(default = "default_progress_poll_ms")]
    pub progress_poll_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            progress_poll_ms: default_progress_poll_ms(),
        }
    }
}

impl HostConfig {
    pub fn with_progress_poll_ms(mut self, interval_ms: u64) -> Self {
        self.progress_poll_ms = interval_ms;
        self
    }
}

fn default_progress_poll_ms() -> u64 {
    250
}
