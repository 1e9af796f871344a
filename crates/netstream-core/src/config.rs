//! Configuration management for netstream
//!
//! Configuration is read from TOML. Every section and field has a default,
//! so an empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [server]
//! backlog = 64
//! blocking = false
//! accept_timeout_ms = 250
//!
//! [client]
//! timeout_ms = 5000
//! persistent = false
//!
//! [client.context.socket]
//! tcp_nodelay = true
//! ```

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::transport::{ContextOptions, DEFAULT_BACKLOG};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the configuration file for [`Config::load`].
pub const CONFIG_ENV: &str = "NETSTREAM_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LogConfig,

    /// Server socket defaults
    #[serde(default)]
    pub server: ServerConfig,

    /// Client connection defaults
    #[serde(default)]
    pub client: ClientConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, colored output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "unknown log format: {s}. Expected one of: pretty, json"
            )),
        }
    }
}

/// Defaults applied to servers created through the factory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen backlog for stream servers
    #[serde(default = "default_backlog")]
    pub backlog: i32,

    /// Whether new servers start in blocking mode
    #[serde(default = "default_true")]
    pub blocking: bool,

    /// Accept wait used by the CLI event loop
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: default_backlog(),
            blocking: true,
            accept_timeout_ms: default_accept_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_true() -> bool {
    true
}

fn default_accept_timeout_ms() -> u64 {
    250
}

/// Defaults applied to clients created through the factory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connect timeout in milliseconds; unset leaves it to the platform
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Reuse process-wide connections keyed by URI
    #[serde(default)]
    pub persistent: bool,

    /// Per-wrapper connection options (`[client.context.socket]` etc.)
    #[serde(default)]
    pub context: ContextOptions,
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from `$NETSTREAM_CONFIG`, or defaults when unset
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load_from(&PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::Config(err.to_string()))
    }
}
