//! Runtime configuration.
//!
//! Settings come from an optional TOML file, then environment variables
//! prefixed with `LATHEWATCH_` (nested keys joined with `__`), then the
//! command line.
//!
//! ```toml
//! [stream]
//! url = "ws://127.0.0.1:8000/ws"
//! reconnect_delay_ms = 2000
//! start_policy = "on-message-subscribe"   # or "manual"
//!
//! [history]
//! endpoint = "http://127.0.0.1:8000"
//! timeout_secs = 10
//! bootstrap = true
//!
//! [display]
//! timezone = "local"                      # or "utc"
//! ```
//!
//! For example `LATHEWATCH_STREAM__URL=wss://sensor.local/ws` overrides
//! `stream.url`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::data::DisplayZone;
use crate::error::BootstrapError;
use crate::hub::HubOptions;
use crate::source::{HistoryClient, DEFAULT_RECONNECT_DELAY};
use crate::subscribe::StartPolicy;

const ENV_PREFIX: &str = "LATHEWATCH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub stream: StreamSettings,
    pub history: HistorySettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub start_policy: StartPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            start_policy: StartPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Seed the series from `/history` at startup.
    pub bootstrap: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 10,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub timezone: DisplayZone,
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            );
        }

        let config = builder
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration from the environment".to_string(),
            })?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.reconnect_delay_ms)
    }

    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            reconnect_delay: self.reconnect_delay(),
            start_policy: self.stream.start_policy,
            zone: self.display.timezone,
            ..HubOptions::default()
        }
    }

    pub fn history_client(&self) -> Result<HistoryClient, BootstrapError> {
        HistoryClient::builder()
            .endpoint(self.history.endpoint.clone())
            .timeout(Duration::from_secs(self.history.timeout_secs))
            .build()
    }
}
