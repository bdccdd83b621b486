//! Error types for the exporter.
//!
//! This module defines the error taxonomy shared by topology discovery,
//! connection management and metric collection.

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionError;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the exporter.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// A node could not be reached, rejected the connection, or failed its
    /// liveness check.
    #[error("Failed to connect to '{address}': {source}")]
    Connect {
        /// Address that was being connected
        address: String,
        /// Underlying transport error
        #[source]
        source: ConnectionError,
    },

    /// The configured connection URI is malformed.
    #[error("Invalid connection URI '{uri}': {message}")]
    InvalidUri {
        /// Offending URI (credentials stripped)
        uri: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Topology Errors
    // ========================================================================
    /// Router hostname resolution failed.
    #[error("Failed to resolve router host '{host}': {source}")]
    Resolution {
        /// Hostname being resolved
        host: String,
        /// Resolver error
        #[source]
        source: std::io::Error,
    },

    /// Router hostname resolved to an empty address set.
    #[error("Router host '{0}' resolved to no addresses")]
    NoAddress(String),

    /// The shard map query failed or returned an unexpected document.
    #[error("Shard map query failed: {0}")]
    ShardMap(String),

    /// Node role detection failed.
    #[error("Cannot detect node type: {0}")]
    RoleDetection(String),

    /// Topology labels could not be resolved for a node.
    #[error("Cannot resolve topology labels: {0}")]
    Topology(String),

    /// Invalid shard-name prefix pattern.
    #[error("Invalid shard name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    // ========================================================================
    // Collection Errors
    // ========================================================================
    /// A single collector unit failed for a single node.
    #[error("Collector '{collector}' failed: {message}")]
    Collector {
        /// Collector name
        collector: &'static str,
        /// Error message
        message: String,
    },

    /// Error from the metrics library.
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Config file not found.
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new connect error.
    pub fn connect(address: impl Into<String>, source: ConnectionError) -> Self {
        Self::Connect {
            address: address.into(),
            source,
        }
    }

    /// Creates a new invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates a new collector error.
    pub fn collector(collector: &'static str, message: impl Into<String>) -> Self {
        Self::Collector {
            collector,
            message: message.into(),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if a later refresh pass may succeed where this one failed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::Resolution { .. }
                | Error::NoAddress(_)
                | Error::ShardMap(_)
                | Error::RoleDetection(_)
                | Error::Topology(_)
                | Error::Collector { .. }
        )
    }

    /// Returns the process exit code for a startup failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Connect { .. } => 3,
            Error::Resolution { .. } | Error::NoAddress(_) => 4,
            Error::ShardMap(_) | Error::Topology(_) => 5,
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::ConfigNotFound(_)
            | Error::InvalidUri { .. }
            | Error::InvalidPattern(_) => 6,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::NoAddress("mongos".into()).is_recoverable());
        assert!(Error::ShardMap("missing map".into()).is_recoverable());
        assert!(Error::connect("a", ConnectionError::ConnectionClosed).is_recoverable());
        assert!(!Error::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            Error::connect("a", ConnectionError::ConnectionClosed).exit_code(),
            3
        );
        assert_eq!(Error::NoAddress("h".into()).exit_code(), 4);
        assert_eq!(Error::invalid_config("web.telemetry_path", "x").exit_code(), 6);
        assert_eq!(Error::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_context_wraps_source() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = res.context("reading config").unwrap_err();
        assert_eq!(err.to_string(), "reading config");
        assert!(std::error::Error::source(&err).is_some());
    }
}
