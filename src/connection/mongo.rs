//! MongoDB driver backed connection implementation.
//!
//! Each [`MongoConnection`] wraps one driver [`Client`]. The driver keeps its
//! own small pool of sockets per client; from the exporter's point of view the
//! client is one logical connection to one node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{debug, trace, warn};

use super::config::{ConnectionConfig, APP_NAME};
use super::{
    command_name, redact_uri, scrub_password, Connection, ConnectionError, ConnectionResult,
    Connector, SharedConnection,
};

impl From<mongodb::error::Error> for ConnectionError {
    fn from(err: mongodb::error::Error) -> Self {
        ConnectionError::ConnectionFailed(err.to_string())
    }
}

/// A connection to one node through the official driver.
pub struct MongoConnection {
    identifier: String,
    client: Client,
    command_timeout: Duration,
    closed: AtomicBool,
}

impl MongoConnection {
    fn new(identifier: String, client: Client, command_timeout: Duration) -> Self {
        Self {
            identifier,
            client,
            command_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true once [`Connection::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MongoConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConnection")
            .field("identifier", &self.identifier)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Connection for MongoConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn run_command(&self, database: &str, command: Document) -> ConnectionResult<Document> {
        if self.is_closed() {
            return Err(ConnectionError::ConnectionClosed);
        }

        let name = command_name(&command).to_string();
        trace!(address = %self.identifier, command = %name, database, "running command");

        let db = self.client.database(database);
        let fut = db.run_command(command, None);
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(ConnectionError::command_failed(name, e.to_string())),
            Err(_) => Err(ConnectionError::timeout(name, self.command_timeout)),
        }
    }

    async fn close(&self) -> ConnectionResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(address = %self.identifier, "closing connection");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Opens [`MongoConnection`]s with a fixed client identity.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector {
    config: ConnectionConfig,
}

impl MongoConnector {
    /// Create a new connector with the given deadlines.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Get the connector configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn client_options(&self, uri: &str, direct: bool) -> ConnectionResult<ClientOptions> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(scrub_password(uri, &e.to_string())))?;
        options.app_name = Some(APP_NAME.to_string());
        options.direct_connection = Some(direct);
        options.connect_timeout = Some(self.config.connect_timeout);
        options.server_selection_timeout = Some(self.config.connect_timeout);
        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: &str, direct: bool) -> ConnectionResult<SharedConnection> {
        let options = self.client_options(uri, direct).await?;
        let client = Client::with_options(options)?;
        let conn = MongoConnection::new(redact_uri(uri), client, self.config.command_timeout);

        let ping = conn.run_command("admin", doc! { "ping": 1 });
        let outcome = match tokio::time::timeout(self.config.connect_timeout, ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::ConnectionFailed(e.to_string())),
            Err(_) => Err(ConnectionError::timeout("ping", self.config.connect_timeout)),
        };

        if let Err(e) = outcome {
            warn!(address = %conn.identifier, error = %e, "liveness check failed, discarding client");
            if let Err(close_err) = conn.close().await {
                warn!(address = %conn.identifier, error = %close_err, "error closing discarded client");
            }
            return Err(e);
        }

        Ok(Arc::new(conn))
    }
}
