//! Central Station: TCP ⇄ ZeroMQ bridge for trading terminals (entry point).
//!
//! Trading terminals connect over plain TCP and exchange null-terminated
//! text messages.  Everything a terminal sends is published on the bus;
//! everything published to the bus is broadcast to every connected terminal.
//!
//! # Usage
//!
//! ```text
//! central-station [OPTIONS]
//!
//! Options:
//!   --config <PATH>               TOML configuration file
//!   --listen <ADDR>               TCP listen address [default: 0.0.0.0:1995]
//!   --publish-endpoint <EP>       Bus endpoint to publish on [default: tcp://0.0.0.0:1986]
//!   --subscribe-endpoint <EP>     Bus endpoint to subscribe on [default: tcp://0.0.0.0:1985]
//!   --read-buffer-size <BYTES>    Per-read buffer size [default: 256]
//!   --max-frame-len <BYTES>       Inbound frame cap per client [default: 16 MiB]
//!   --max-pending-output <BYTES>  Outbound backlog cap per client [default: 64 MiB]
//!   --read-timeout-ms <MS>        Poll wait per iteration [default: 50]
//!   --idle-sleep-ms <MS>          Pause after an idle iteration [default: 10]
//!   --error-isolation <MODE>      per-connection | per-batch
//!   --republish <BOOL>            Republish bus messages onto the bus
//!   --print-config                Print the effective configuration and exit
//! ```
//!
//! # Configuration precedence
//!
//! CLI flags > `STATION_*` environment variables > config file > defaults.
//!
//! | Variable                      | Flag                   |
//! |-------------------------------|------------------------|
//! | `STATION_CONFIG`              | `--config`             |
//! | `STATION_LISTEN`              | `--listen`             |
//! | `STATION_PUBLISH_ENDPOINT`    | `--publish-endpoint`   |
//! | `STATION_SUBSCRIBE_ENDPOINT`  | `--subscribe-endpoint` |
//! | `STATION_ERROR_ISOLATION`     | `--error-isolation`    |
//! | `STATION_REPUBLISH`           | `--republish`          |
//! | `STATION_LOG_LEVEL`           | `--log-level`          |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use station_bridge::application::RelayLoop;
use station_bridge::domain::{BridgeConfig, ErrorIsolation};
use station_bridge::infrastructure::config_file::{self, FileConfig};
use station_bridge::infrastructure::{ConnectionRegistry, ZmqBus};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP to ZeroMQ bridge for trading terminals.
///
/// Every option is optional; anything not given falls back to the environment,
/// then the config file, then the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "central-station",
    about = "Relays null-terminated TCP messages to and from a ZeroMQ PUB/SUB bus",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "STATION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address the TCP listener binds to.
    #[arg(long, env = "STATION_LISTEN", value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// `listen(2)` backlog.
    #[arg(long, env = "STATION_LISTEN_BACKLOG")]
    listen_backlog: Option<u32>,

    /// ZeroMQ endpoint the bridge binds its PUB socket to.
    #[arg(long, env = "STATION_PUBLISH_ENDPOINT", value_name = "ENDPOINT")]
    publish_endpoint: Option<String>,

    /// ZeroMQ endpoint the bridge binds its SUB socket to.
    #[arg(long, env = "STATION_SUBSCRIBE_ENDPOINT", value_name = "ENDPOINT")]
    subscribe_endpoint: Option<String>,

    /// Bytes taken from one client socket per read.
    #[arg(long, env = "STATION_READ_BUFFER_SIZE", value_name = "BYTES")]
    read_buffer_size: Option<usize>,

    /// Largest unterminated frame accepted from a client [default: 16 MiB].
    ///
    /// Messages may be any length on the wire; a client whose unterminated
    /// frame grows past this cap is disconnected so it cannot pin unbounded
    /// memory.  Raise it if terminals send larger messages.
    #[arg(long, env = "STATION_MAX_FRAME_LEN", value_name = "BYTES")]
    max_frame_len: Option<usize>,

    /// How long one polling round waits for client data.
    #[arg(long, env = "STATION_READ_TIMEOUT_MS", value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Output bytes queued for a slow client before it is dropped [default: 64 MiB].
    #[arg(long, env = "STATION_MAX_PENDING_OUTPUT", value_name = "BYTES")]
    max_pending_output: Option<usize>,

    /// Pause after an iteration in which nothing happened.
    #[arg(long, env = "STATION_IDLE_SLEEP_MS", value_name = "MS")]
    idle_sleep_ms: Option<u64>,

    /// `per-connection` or `per-batch`.
    #[arg(long, env = "STATION_ERROR_ISOLATION", value_name = "MODE")]
    error_isolation: Option<ErrorIsolation>,

    /// Republish every bus message back onto the publish endpoint.
    #[arg(long, env = "STATION_REPUBLISH", value_name = "BOOL")]
    republish: Option<bool>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "STATION_LOG_LEVEL", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Builds the effective [`BridgeConfig`]: file (if any) under CLI/env
    /// overrides, then validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the merged
    /// configuration is invalid.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => config_file::load(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(addr) = self.listen {
            config.listen_addr = addr;
        }
        if let Some(backlog) = self.listen_backlog {
            config.listen_backlog = backlog;
        }
        if let Some(endpoint) = self.publish_endpoint {
            config.publish_endpoint = endpoint;
        }
        if let Some(endpoint) = self.subscribe_endpoint {
            config.subscribe_endpoint = endpoint;
        }
        if let Some(size) = self.read_buffer_size {
            config.read_buffer_size = size;
        }
        if let Some(len) = self.max_frame_len {
            config.max_frame_len = len;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = self.max_pending_output {
            config.max_pending_output = bytes;
        }
        if let Some(ms) = self.idle_sleep_ms {
            config.idle_sleep = Duration::from_millis(ms);
        }
        if let Some(mode) = self.error_isolation {
            config.error_isolation = mode;
        }
        if let Some(republish) = self.republish {
            config.republish_bus_messages = republish;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Parse the CLI and build the validated configuration.
/// 2. Initialise `tracing`; `RUST_LOG` wins over the configured level.
/// 3. Install the Ctrl+C handler that clears the shared running flag.
/// 4. Bind the TCP listener and both bus sockets.  Any failure here is fatal.
/// 5. Run the relay loop until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;
    let config = cli.into_bridge_config()?;

    if print_config {
        print!("{}", FileConfig::from(&config).to_toml_string()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "central station starting: tcp={}, publish={}, subscribe={}, isolation={}",
        config.listen_addr, config.publish_endpoint, config.subscribe_endpoint, config.error_isolation
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, stopping after the current iteration");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let registry = ConnectionRegistry::bind(&config)
        .with_context(|| format!("binding TCP listener on {}", config.listen_addr))?;
    let bus = ZmqBus::setup(&config.publish_endpoint, &config.subscribe_endpoint)
        .await
        .context("setting up the ZeroMQ bus")?;

    let mut relay = RelayLoop::new(registry, bus, &config);
    relay.run(running).await;

    info!("central station stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_yields_defaults() {
        // Arrange
        let cli = Cli::default();

        // Act
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_cli_listen_override() {
        let cli = Cli::try_parse_from(["central-station", "--listen", "127.0.0.1:2995"]).unwrap();
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:2995".parse().unwrap());
    }

    #[test]
    fn test_cli_endpoint_overrides() {
        let cli = Cli::try_parse_from([
            "central-station",
            "--publish-endpoint",
            "tcp://127.0.0.1:7001",
            "--subscribe-endpoint",
            "tcp://127.0.0.1:7000",
        ])
        .unwrap();

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.publish_endpoint, "tcp://127.0.0.1:7001");
        assert_eq!(config.subscribe_endpoint, "tcp://127.0.0.1:7000");
    }

    #[test]
    fn test_cli_timing_overrides_are_milliseconds() {
        let cli = Cli::try_parse_from([
            "central-station",
            "--read-timeout-ms",
            "20",
            "--idle-sleep-ms",
            "5",
        ])
        .unwrap();

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.read_timeout, Duration::from_millis(20));
        assert_eq!(config.idle_sleep, Duration::from_millis(5));
    }

    #[test]
    fn test_cli_size_limit_overrides() {
        let cli = Cli::try_parse_from([
            "central-station",
            "--max-frame-len",
            "33554432",
            "--max-pending-output",
            "1048576",
        ])
        .unwrap();

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.max_frame_len, 32 * 1024 * 1024);
        assert_eq!(config.max_pending_output, 1024 * 1024);
    }

    #[test]
    fn test_cli_parses_error_isolation_and_republish() {
        let cli = Cli::try_parse_from([
            "central-station",
            "--error-isolation",
            "per-batch",
            "--republish",
            "true",
        ])
        .unwrap();

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.error_isolation, ErrorIsolation::PerBatch);
        assert!(config.republish_bus_messages);
    }

    #[test]
    fn test_cli_rejects_unknown_error_isolation() {
        let result = Cli::try_parse_from(["central-station", "--error-isolation", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_invalid_listen_address() {
        let result = Cli::try_parse_from(["central-station", "--listen", "not.an.address"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_idle_sleep_fails_validation() {
        // Arrange: a value that parses but would make the loop spin
        let cli = Cli {
            idle_sleep_ms: Some(0),
            ..Cli::default()
        };

        // Act
        let result = cli.into_bridge_config();

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/definitely/not/here/station.toml")),
            ..Cli::default()
        };
        assert!(cli.into_bridge_config().is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        // Arrange: the file sets both endpoints, the CLI overrides one
        let path = std::env::temp_dir().join(format!(
            "central-station-cli-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[bus]\npublish_endpoint = \"tcp://127.0.0.1:7101\"\nsubscribe_endpoint = \"tcp://127.0.0.1:7100\"\n",
        )
        .unwrap();
        let cli = Cli {
            config: Some(path.clone()),
            publish_endpoint: Some("tcp://127.0.0.1:7201".to_string()),
            ..Cli::default()
        };

        // Act
        let config = cli.into_bridge_config();
        let _ = std::fs::remove_file(&path);
        let config = config.unwrap();

        // Assert
        assert_eq!(config.publish_endpoint, "tcp://127.0.0.1:7201");
        assert_eq!(config.subscribe_endpoint, "tcp://127.0.0.1:7100");
    }
}
