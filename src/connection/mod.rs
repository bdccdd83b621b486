//! Connection layer for database node communication.
//!
//! This module provides a unified interface for issuing administrative
//! commands against a single MongoDB node, independent of the driver used to
//! reach it. All connections implement the [`Connection`] trait and are
//! opened through a [`Connector`].
//!
//! # Connection Lifecycle
//!
//! A connection returned by [`Connector::connect`] has already passed a
//! liveness check. It stays open until [`Connection::close`] is called by its
//! single logical owner: a [`ConnectionTable`](crate::topology::ConnectionTable)
//! entry for pooled connections, or the handling request for request-scoped
//! ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use mongodb_exporter::connection::{Connector, MongoConnector, ConnectionConfig};
//! use mongodb::bson::doc;
//!
//! let connector = MongoConnector::new(ConnectionConfig::default());
//! let conn = connector.connect("mongodb://127.0.0.1:27017", true).await?;
//! let status = conn.run_command("admin", doc! { "serverStatus": 1 }).await?;
//! conn.close().await?;
//! ```

/// Connection configuration types.
pub mod config;

/// MongoDB driver backed connection implementation.
pub mod mongo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ConnectionString;
use thiserror::Error;

pub use config::{ConnectionConfig, APP_NAME};
pub use mongo::{MongoConnection, MongoConnector};

/// Errors that can occur during connection operations.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to establish the connection or the liveness check failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection URI could not be applied.
    #[error("Invalid connection URI: {0}")]
    InvalidUri(String),

    /// The node rejected or failed an administrative command.
    #[error("Command '{command}' failed: {message}")]
    CommandFailed {
        /// Command name
        command: String,
        /// Error message
        message: String,
    },

    /// The operation exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// The connection was already closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ConnectionError {
    /// Creates a new command failure.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Returns true if this error was caused by an exceeded deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout { .. })
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// A connection shared between its owner and in-flight scrapes.
pub type SharedConnection = Arc<dyn Connection>;

/// A live handle to one database node.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection identifier (the address it was opened against).
    fn identifier(&self) -> &str;

    /// Run an administrative command against the given database.
    async fn run_command(&self, database: &str, command: Document) -> ConnectionResult<Document>;

    /// Check that the node answers.
    async fn ping(&self) -> ConnectionResult<()> {
        self.run_command("admin", doc! { "ping": 1 }).await.map(|_| ())
    }

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> ConnectionResult<()>;
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identifier", &self.identifier())
            .finish()
    }
}

/// Opens validated connections to single nodes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `uri` and verify it answers before returning.
    ///
    /// With `direct` set, replica-set member discovery is bypassed and the
    /// connection talks to exactly the given address. On failure no
    /// connection is left open.
    async fn connect(&self, uri: &str, direct: bool) -> ConnectionResult<SharedConnection>;
}

/// Strips the password from a connection URI so it can be logged.
///
/// Strings that do not parse as URLs are masked textually.
pub fn redact_uri(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut parsed) => {
            if parsed.password().is_none() {
                return uri.to_string();
            }
            if parsed.set_password(Some("xxx")).is_err() {
                return mask_userinfo(uri);
            }
            parsed.to_string()
        }
        Err(_) => mask_userinfo(uri),
    }
}

fn mask_userinfo(uri: &str) -> String {
    match password_span(uri) {
        Some((from, to)) => format!("{}xxx{}", &uri[..from], &uri[to..]),
        None => uri.to_string(),
    }
}

/// Byte range of the password in the authority, if there is one.
fn password_span(uri: &str) -> Option<(usize, usize)> {
    let start = uri.find("://")? + 3;
    let authority_end = uri[start..].find('/').map_or(uri.len(), |i| start + i);
    let at = start + uri[start..authority_end].rfind('@')?;
    let colon = start + uri[start..at].find(':')?;
    Some((colon + 1, at))
}

/// Check a connection string the way the driver reads it.
///
/// Seed lists and `mongodb+srv://` URIs are accepted. Nothing is resolved.
pub fn check_uri(uri: &str) -> ConnectionResult<()> {
    ConnectionString::parse(uri)
        .map(|_| ())
        .map_err(|e| ConnectionError::InvalidUri(scrub_password(uri, &e.to_string())))
}

/// Mask the password of `uri` wherever it shows up in `message`.
pub(crate) fn scrub_password(uri: &str, message: &str) -> String {
    match password_span(uri).filter(|(from, to)| to > from) {
        Some((from, to)) => message.replace(&uri[from..to], "xxx"),
        None => message.to_string(),
    }
}

/// Returns the name of a command document (its first key).
pub fn command_name(command: &Document) -> &str {
    command.keys().next().map(String::as_str).unwrap_or("")
}
