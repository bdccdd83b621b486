//! Connection configuration module
//!
//! Deadlines applied to every node-level operation and the client identity
//! presented to the server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application name reported to the server on every connection.
pub const APP_NAME: &str = "mongodb_exporter";

/// Default connect + liveness deadline in seconds
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default per-command deadline in seconds
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 10;

/// Deadlines for node-level operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Deadline for opening a connection, including its liveness check
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for a single administrative command
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(DEFAULT_COMMAND_TIMEOUT)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command deadline
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}
