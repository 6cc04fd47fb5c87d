//! Balancer configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! command-line flags, each layer overriding the previous one.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use rotor_core::{BackendRegistry, RegistryError};

use crate::health_check::ProbeMode;
use crate::relay::{RelayConfig, DEFAULT_BUFFER_SIZE};

/// Command-line arguments of the `rotor` binary.
#[derive(Debug, Default, Parser)]
#[command(name = "rotor", version, about = "Liveness-aware round-robin TCP load balancer")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to accept client connections on.
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Backend `host:port`; repeat for each backend. Replaces the file's list.
    #[arg(short = 'b', long = "backend")]
    pub backends: Vec<String>,

    /// Log filter, e.g. `info` or `rotor_proxy=debug`. `RUST_LOG` takes precedence.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The backend list cannot form a registry.
    #[error(transparent)]
    Backends(#[from] RegistryError),
}

/// Full balancer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to accept client connections on.
    pub listen: SocketAddr,
    /// Ordered backend `host:port` list.
    pub backends: Vec<String>,
    /// Health prober settings.
    pub health: HealthConfig,
    /// Dispatch settings.
    pub dispatch: DispatchConfig,
    /// Relay settings.
    pub relay: RelaySection,
    /// Logging settings.
    pub log: LogConfig,
}

/// `[health]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Milliseconds between probe rounds.
    pub interval_ms: u64,
    /// Milliseconds allowed for one probe connect.
    pub timeout_ms: u64,
    /// Sequential or concurrent rounds.
    pub mode: ProbeMode,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Milliseconds allowed for a backend dial.
    pub connect_timeout_ms: u64,
    /// Retry the next alive backend when a dial fails.
    pub failover: bool,
}

/// `[relay]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    /// Copy buffer per direction, in bytes.
    pub buffer_size: usize,
    /// Session idle timeout in milliseconds; absent or 0 disables it.
    pub idle_timeout_ms: Option<u64>,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    /// JSON output instead of human-readable lines.
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backends: vec![
                "localhost:8000".to_string(),
                "localhost:8001".to_string(),
                "localhost:8002".to_string(),
            ],
            health: HealthConfig::default(),
            dispatch: DispatchConfig::default(),
            relay: RelaySection::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            timeout_ms: 2_000,
            mode: ProbeMode::Sequential,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            failover: false,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout_ms: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Resolve defaults, the file named by `cli.config`, and CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = cli.listen {
            self.listen = listen;
        }
        if !cli.backends.is_empty() {
            self.backends = cli.backends.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log.level = level.clone();
        }
        if cli.json_logs {
            self.log.json = true;
        }
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "health.interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.health.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "health.timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.dispatch.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.connect_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.relay.buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.buffer_size",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Build the backend registry from the configured list.
    pub fn build_registry(&self) -> Result<BackendRegistry, ConfigError> {
        Ok(BackendRegistry::new(self.backends.iter().cloned())?)
    }

    /// Time between probe rounds.
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health.interval_ms)
    }

    /// Bound on one probe connect.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health.timeout_ms)
    }

    /// Bound on one backend dial.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.connect_timeout_ms)
    }

    /// Relay tunables.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            buffer_size: self.relay.buffer_size,
            idle_timeout: self
                .relay
                .idle_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}
