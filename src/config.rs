//! Configuration module for the exporter
//!
//! Options are layered, later sources winning:
//! - Built-in defaults
//! - Configuration file (TOML, YAML or JSON)
//! - Environment variables
//! - Command-line arguments
//!
//! The resulting [`Options`] are read-only once the exporter starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::connection::{check_uri, redact_uri, ConnectionConfig};
use crate::error::{Error, Result};
use crate::logging::LogFormat;
use crate::topology::{parse_base_uri, shard_name_pattern, DEFAULT_REFRESH_INTERVAL};

/// Environment variable holding the connection URI.
pub const ENV_URI: &str = "MONGODB_URI";
/// Environment variable holding the listen address.
pub const ENV_LISTEN_ADDRESS: &str = "MONGODB_EXPORTER_LISTEN_ADDRESS";
/// Environment variable holding the telemetry path.
pub const ENV_TELEMETRY_PATH: &str = "MONGODB_EXPORTER_TELEMETRY_PATH";
/// Environment variable holding the log level.
pub const ENV_LOG_LEVEL: &str = "MONGODB_EXPORTER_LOG_LEVEL";
/// Environment variable holding the topology refresh interval.
pub const ENV_REFRESH_INTERVAL: &str = "MONGODB_EXPORTER_REFRESH_INTERVAL";
/// Environment variable naming the configuration file.
pub const ENV_CONFIG: &str = "MONGODB_EXPORTER_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Database connection settings
    pub mongodb: MongoDbConfig,

    /// Topology discovery settings
    pub topology: TopologyConfig,

    /// Collector selection
    pub collectors: CollectorsConfig,

    /// HTTP endpoint settings
    pub web: WebConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoDbConfig {
    /// Connection URI of the node or router
    pub uri: String,

    /// Talk to exactly the configured address, bypassing member discovery
    pub direct_connect: bool,

    /// Keep connections across scrapes instead of opening one per scrape
    pub global_conn_pool: bool,

    /// Connect and command deadlines
    #[serde(flatten)]
    pub timeouts: ConnectionConfig,
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            direct_connect: false,
            global_conn_pool: false,
            timeouts: ConnectionConfig::default(),
        }
    }
}

/// Topology discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Scrape every router and shard member in one response
    pub broadcast_mode: bool,

    /// Prefix pattern selecting shards by name; empty selects all
    pub shard_name_prefix: String,

    /// Interval between background refresh passes
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            broadcast_mode: false,
            shard_name_prefix: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Collector selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// `db.collection` entries for collection statistics
    pub collstats_collections: Vec<String>,

    /// `db.collection` entries for index statistics
    pub indexstats_collections: Vec<String>,

    /// Skip the diagnostic data collector
    pub disable_diagnostic_data: bool,

    /// Skip the replica-set status collector
    pub disable_replicaset_status: bool,

    /// Skip `serverStatus` on routers
    pub disable_mongos_status: bool,

    /// Also emit legacy metric names
    pub compatible_mode: bool,

    /// Expand bare database names into their collections
    pub discovering_mode: bool,
}

/// HTTP endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to listen on
    pub listen_address: String,

    /// Path serving metrics
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9216".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Options {
    /// Load options from defaults, an optional file and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut options = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        options.apply_env_overrides()?;
        Ok(options)
    }

    /// Load options from a file. The format follows the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let options = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| {
                    Error::Config(format!("Failed to parse {}: {e}", path.display()))
                })?,
        };
        Ok(options)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // MONGODB_URI
        if let Ok(uri) = std::env::var(ENV_URI) {
            self.mongodb.uri = uri;
        }

        // MONGODB_EXPORTER_LISTEN_ADDRESS
        if let Ok(address) = std::env::var(ENV_LISTEN_ADDRESS) {
            self.web.listen_address = address;
        }

        // MONGODB_EXPORTER_TELEMETRY_PATH
        if let Ok(path) = std::env::var(ENV_TELEMETRY_PATH) {
            self.web.telemetry_path = path;
        }

        // MONGODB_EXPORTER_LOG_LEVEL
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        // MONGODB_EXPORTER_REFRESH_INTERVAL
        if let Ok(interval) = std::env::var(ENV_REFRESH_INTERVAL) {
            self.topology.refresh_interval = humantime::parse_duration(&interval)
                .map_err(|e| Error::invalid_config(ENV_REFRESH_INTERVAL, e.to_string()))?;
        }

        Ok(())
    }

    /// Check the options before anything connects.
    pub fn validate(&self) -> Result<()> {
        if self.mongodb.uri.trim().is_empty() {
            return Err(Error::invalid_config("mongodb.uri", "must not be empty"));
        }
        check_uri(&self.mongodb.uri).map_err(|e| {
            Error::invalid_config("mongodb.uri", format!("{}: {e}", redact_uri(&self.mongodb.uri)))
        })?;
        // Broadcast rewrites the router host, so it needs a single plain host.
        if self.broadcast() {
            parse_base_uri(&self.mongodb.uri).map_err(|e| {
                Error::invalid_config("mongodb.uri", format!("broadcast mode: {e}"))
            })?;
        }

        let path = &self.web.telemetry_path;
        if !path.starts_with('/') || path == "/" {
            return Err(Error::invalid_config(
                "web.telemetry_path",
                "must start with '/' and must not be '/'",
            ));
        }

        shard_name_pattern(&self.topology.shard_name_prefix)?;

        if self.topology.refresh_interval.is_zero() {
            return Err(Error::invalid_config("topology.refresh_interval", "must be positive"));
        }
        if self.mongodb.timeouts.connect_timeout.is_zero() {
            return Err(Error::invalid_config("mongodb.connect_timeout", "must be positive"));
        }
        if self.mongodb.timeouts.command_timeout.is_zero() {
            return Err(Error::invalid_config("mongodb.command_timeout", "must be positive"));
        }
        Ok(())
    }

    /// True if scrapes should cover the whole cluster.
    ///
    /// Broadcast needs long-lived connections, so it only applies together
    /// with the global connection pool.
    pub fn broadcast(&self) -> bool {
        self.topology.broadcast_mode && self.mongodb.global_conn_pool
    }
}
