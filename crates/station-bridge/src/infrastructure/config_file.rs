//! TOML configuration file support.
//!
//! The file is optional; every key in it is optional too.  Missing keys keep
//! the built-in defaults from [`BridgeConfig::default`].  Durations are given
//! in milliseconds.
//!
//! ```toml
//! [listener]
//! address = "0.0.0.0:1995"
//! backlog = 16
//! read_buffer_size = 256
//! max_frame_len = 16777216
//! max_pending_output = 67108864
//! read_timeout_ms = 50
//!
//! [bus]
//! publish_endpoint = "tcp://0.0.0.0:1986"
//! subscribe_endpoint = "tcp://0.0.0.0:1985"
//! republish = false
//!
//! [relay]
//! idle_sleep_ms = 10
//! error_isolation = "per-connection"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Unknown keys are rejected so that a typo does not silently fall back to a
//! default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BridgeConfig, ErrorIsolation};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk layout of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listener: ListenerSection,
    pub bus: BusSection,
    pub relay: RelaySection,
    pub logging: LoggingSection,
}

/// TCP side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerSection {
    pub address: SocketAddr,
    pub backlog: u32,
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
    pub max_pending_output: usize,
    pub read_timeout_ms: u64,
}

/// Bus side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub publish_endpoint: String,
    pub subscribe_endpoint: String,
    /// Republish bus-origin messages after broadcasting them.
    pub republish: bool,
}

/// Relay loop behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub idle_sleep_ms: u64,
    pub error_isolation: ErrorIsolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for ListenerSection {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            address: cfg.listen_addr,
            backlog: cfg.listen_backlog,
            read_buffer_size: cfg.read_buffer_size,
            max_frame_len: cfg.max_frame_len,
            max_pending_output: cfg.max_pending_output,
            read_timeout_ms: millis(cfg.read_timeout),
        }
    }
}

impl From<&BridgeConfig> for BusSection {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            publish_endpoint: cfg.publish_endpoint.clone(),
            subscribe_endpoint: cfg.subscribe_endpoint.clone(),
            republish: cfg.republish_bus_messages,
        }
    }
}

impl From<&BridgeConfig> for RelaySection {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            idle_sleep_ms: millis(cfg.idle_sleep),
            error_isolation: cfg.error_isolation,
        }
    }
}

impl From<&BridgeConfig> for LoggingSection {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            level: cfg.log_level.clone(),
        }
    }
}

impl From<&BridgeConfig> for FileConfig {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            listener: ListenerSection::from(cfg),
            bus: BusSection::from(cfg),
            relay: RelaySection::from(cfg),
            logging: LoggingSection::from(cfg),
        }
    }
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Parse`] for malformed TOML, wrong value
    /// types and unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Serialize`] if rendering fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Converts the file layout into a [`BridgeConfig`].  No validation.
    pub fn into_bridge_config(self) -> BridgeConfig {
        BridgeConfig {
            listen_addr: self.listener.address,
            listen_backlog: self.listener.backlog,
            publish_endpoint: self.bus.publish_endpoint,
            subscribe_endpoint: self.bus.subscribe_endpoint,
            read_buffer_size: self.listener.read_buffer_size,
            max_frame_len: self.listener.max_frame_len,
            read_timeout: Duration::from_millis(self.listener.read_timeout_ms),
            max_pending_output: self.listener.max_pending_output,
            idle_sleep: Duration::from_millis(self.relay.idle_sleep_ms),
            error_isolation: self.relay.error_isolation,
            republish_bus_messages: self.bus.republish,
            log_level: self.logging.level,
        }
    }
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if its content is invalid.
pub fn load(path: &Path) -> Result<BridgeConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FileConfig::from_toml_str(&text)?.into_bridge_config())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
