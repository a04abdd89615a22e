//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is populated by the binary from (in increasing precedence) built-in
//! defaults, an optional TOML file, environment variables and CLI flags.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads inside the domain) makes the bridge easy to embed in tests.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors describing an unusable configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The error isolation mode string is not recognised.
    #[error("unknown error isolation mode '{0}' (expected 'per-connection' or 'per-batch')")]
    UnknownErrorIsolation(String),
}

/// How far a single connection failure reaches while polling the live set.
///
/// Broadcast delivery is always isolated per connection regardless of this
/// setting: a failing client never prevents delivery to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorIsolation {
    /// A failed read drops that connection and polling continues with the
    /// remaining ready connections in the same round.
    #[default]
    PerConnection,
    /// A failed read drops that connection and ends the current polling
    /// round.  Connections not yet read are serviced on the next iteration;
    /// their bytes stay in the kernel buffer, so nothing is lost.
    PerBatch,
}

impl fmt::Display for ErrorIsolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorIsolation::PerConnection => f.write_str("per-connection"),
            ErrorIsolation::PerBatch => f.write_str("per-batch"),
        }
    }
}

impl FromStr for ErrorIsolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-connection" | "connection" => Ok(ErrorIsolation::PerConnection),
            "per-batch" | "batch" => Ok(ErrorIsolation::PerBatch),
            other => Err(ConfigError::UnknownErrorIsolation(other.to_string())),
        }
    }
}

/// Default cap on output queued for one slow client (64 MiB).
pub const DEFAULT_MAX_PENDING_OUTPUT: usize = 64 * 1024 * 1024;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use station_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 1995);
/// assert!(!cfg.republish_bus_messages);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the TCP listener for trading terminals binds to.
    pub listen_addr: SocketAddr,

    /// Backlog passed to `listen(2)`.
    pub listen_backlog: u32,

    /// ZeroMQ endpoint the bridge binds its PUB socket to.
    ///
    /// Everything received from TCP clients is published here.
    pub publish_endpoint: String,

    /// ZeroMQ endpoint the bridge binds its SUB socket to.
    ///
    /// Every message published to this endpoint (all topics) is broadcast to
    /// the TCP clients.
    pub subscribe_endpoint: String,

    /// Size of the per-connection read buffer, i.e. the most bytes taken from
    /// one socket in one polling round.
    pub read_buffer_size: usize,

    /// Largest unterminated frame a client may send before it is dropped.
    ///
    /// Messages themselves may be any length; this only bounds the memory a
    /// client can pin by never sending the terminator.
    pub max_frame_len: usize,

    /// Upper bound on how long one polling round waits for any connection
    /// to become readable.
    pub read_timeout: Duration,

    /// Most output bytes queued for one client that has stopped draining its
    /// socket.  A slow client is kept as long as its backlog stays under
    /// this cap; past it the client is dropped.
    pub max_pending_output: usize,

    /// Pause after an iteration in which nothing happened.
    pub idle_sleep: Duration,

    /// Failure reach while polling; see [`ErrorIsolation`].
    pub error_isolation: ErrorIsolation,

    /// Republish every bus-origin message back onto the publish channel after
    /// broadcasting it.
    ///
    /// Off by default: two bridges chained through the same bus with this
    /// enabled would bounce messages between each other forever.
    pub republish_bus_messages: bool,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for BridgeConfig {
    /// | Field                  | Default               |
    /// |------------------------|-----------------------|
    /// | listen_addr            | `0.0.0.0:1995`        |
    /// | listen_backlog         | 16                    |
    /// | publish_endpoint       | `tcp://0.0.0.0:1986`  |
    /// | subscribe_endpoint     | `tcp://0.0.0.0:1985`  |
    /// | read_buffer_size       | 256 bytes             |
    /// | max_frame_len          | 16 MiB                |
    /// | max_pending_output     | 64 MiB                |
    /// | read_timeout           | 50 ms                 |
    /// | idle_sleep             | 10 ms                 |
    /// | error_isolation        | per-connection        |
    /// | republish_bus_messages | false                 |
    /// | log_level              | `info`                |
    fn default() -> Self {
        Self {
            // Compile-time constant address; the parse cannot fail.
            listen_addr: "0.0.0.0:1995".parse().unwrap(),
            listen_backlog: 16,
            publish_endpoint: "tcp://0.0.0.0:1986".to_string(),
            subscribe_endpoint: "tcp://0.0.0.0:1985".to_string(),
            read_buffer_size: 256,
            max_frame_len: station_core::protocol::frame::DEFAULT_MAX_FRAME_LEN,
            max_pending_output: DEFAULT_MAX_PENDING_OUTPUT,
            read_timeout: Duration::from_millis(50),
            idle_sleep: Duration::from_millis(10),
            error_isolation: ErrorIsolation::PerConnection,
            republish_bus_messages: false,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Checks the ranges the relay loop relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(invalid("read_buffer_size", "must be at least 1 byte"));
        }
        if self.max_frame_len == 0 {
            return Err(invalid("max_frame_len", "must be at least 1 byte"));
        }
        if self.read_timeout.is_zero() {
            return Err(invalid("read_timeout", "must be greater than zero"));
        }
        if self.max_pending_output == 0 {
            return Err(invalid("max_pending_output", "must be at least 1 byte"));
        }
        // A zero idle sleep would turn an idle bridge into a busy spin.
        if self.idle_sleep.is_zero() {
            return Err(invalid("idle_sleep", "must be greater than zero"));
        }
        if self.listen_backlog == 0 {
            return Err(invalid("listen_backlog", "must be at least 1"));
        }
        if self.publish_endpoint.trim().is_empty() {
            return Err(invalid("publish_endpoint", "must not be empty"));
        }
        if self.subscribe_endpoint.trim().is_empty() {
            return Err(invalid("subscribe_endpoint", "must not be empty"));
        }
        if self.publish_endpoint == self.subscribe_endpoint {
            return Err(invalid(
                "subscribe_endpoint",
                "must differ from publish_endpoint",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_port_is_1995() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.listen_addr.port(), 1995);
    }

    #[test]
    fn test_default_bus_endpoints() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.publish_endpoint, "tcp://0.0.0.0:1986");
        assert_eq!(cfg.subscribe_endpoint, "tcp://0.0.0.0:1985");
    }

    #[test]
    fn test_default_timings() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.read_timeout, Duration::from_millis(50));
        assert_eq!(cfg.idle_sleep, Duration::from_millis(10));
    }

    #[test]
    fn test_default_size_limits() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.max_frame_len, 16 * 1024 * 1024);
        assert_eq!(cfg.max_pending_output, 64 * 1024 * 1024);
    }

    #[test]
    fn test_zero_pending_output_cap_is_rejected() {
        let cfg = BridgeConfig {
            max_pending_output: 0,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field: "max_pending_output", .. })
        ));
    }

    #[test]
    fn test_republish_is_off_by_default() {
        assert!(!BridgeConfig::default().republish_bus_messages);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(BridgeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_read_buffer_is_rejected() {
        // Arrange
        let cfg = BridgeConfig {
            read_buffer_size: 0,
            ..BridgeConfig::default()
        };

        // Act
        let result = cfg.validate();

        // Assert
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "read_buffer_size", .. })
        ));
    }

    #[test]
    fn test_zero_idle_sleep_is_rejected() {
        let cfg = BridgeConfig {
            idle_sleep: Duration::ZERO,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field: "idle_sleep", .. })
        ));
    }

    #[test]
    fn test_identical_bus_endpoints_are_rejected() {
        let cfg = BridgeConfig {
            subscribe_endpoint: "tcp://0.0.0.0:1986".to_string(),
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_error_isolation_parses_both_modes() {
        assert_eq!("per-connection".parse(), Ok(ErrorIsolation::PerConnection));
        assert_eq!("Per-Batch".parse(), Ok(ErrorIsolation::PerBatch));
        assert_eq!("batch".parse(), Ok(ErrorIsolation::PerBatch));
    }

    #[test]
    fn test_error_isolation_rejects_unknown_mode() {
        assert_eq!(
            "sometimes".parse::<ErrorIsolation>(),
            Err(ConfigError::UnknownErrorIsolation("sometimes".to_string()))
        );
    }

    #[test]
    fn test_error_isolation_display_round_trips() {
        for mode in [ErrorIsolation::PerConnection, ErrorIsolation::PerBatch] {
            assert_eq!(mode.to_string().parse::<ErrorIsolation>(), Ok(mode));
        }
    }
}
