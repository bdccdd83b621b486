//! Where a scrape gets its connections from.
//!
//! The strategy is picked once when the exporter is built. The scrape path
//! only sees a [`Lease`]: the nodes to collect from, plus ownership of any
//! connection opened for this scrape alone.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ScrapeError;
use crate::connection::{Connector, SharedConnection};
use crate::error::Error;
use crate::topology::{Address, ConnectionTable, NodeHandle, NodeRole, TopologyLabelResolver};

/// Nodes to scrape for one request.
///
/// A request-scoped connection is closed by [`release`](Lease::release), or
/// in the background if the lease is dropped first (for example when the
/// request is cancelled).
pub struct Lease {
    targets: Vec<NodeHandle>,
    scoped: Option<SharedConnection>,
}

impl Lease {
    /// Borrow pooled nodes; releasing closes nothing.
    pub fn pooled(targets: Vec<NodeHandle>) -> Self {
        Self {
            targets,
            scoped: None,
        }
    }

    /// Own a connection opened for this request.
    pub fn scoped(node: NodeHandle) -> Self {
        Self {
            scoped: Some(node.connection.clone()),
            targets: vec![node],
        }
    }

    /// Nodes to collect from.
    pub fn targets(&self) -> &[NodeHandle] {
        &self.targets
    }

    /// True if the lease owns its connection.
    pub fn is_scoped(&self) -> bool {
        self.scoped.is_some()
    }

    /// End the lease, closing a request-scoped connection.
    pub async fn release(mut self) {
        if let Some(conn) = self.scoped.take() {
            debug!(address = conn.identifier(), "closing request connection");
            if let Err(e) = conn.close().await {
                warn!(address = conn.identifier(), error = %e, "error closing request connection");
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.scoped.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        warn!(
                            address = conn.identifier(),
                            error = %e,
                            "error closing request connection"
                        );
                    }
                });
            }
        }
    }
}

/// Yields the nodes a scrape collects from.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Strategy name, for logs.
    fn name(&self) -> &'static str;

    /// Get the nodes for one scrape.
    async fn acquire(&self) -> Result<Lease, ScrapeError>;
}

/// Reuses the long-lived connections of the table.
///
/// Serves every router and shard member in broadcast mode, and the single
/// persistent connection otherwise.
pub struct PooledSource {
    table: Arc<ConnectionTable>,
}

impl PooledSource {
    /// Create a source reading `table`.
    pub fn new(table: Arc<ConnectionTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ConnectionSource for PooledSource {
    fn name(&self) -> &'static str {
        "pooled"
    }

    async fn acquire(&self) -> Result<Lease, ScrapeError> {
        Ok(Lease::pooled(self.table.snapshot()))
    }
}

/// Opens one connection per scrape and resolves its labels.
pub struct RequestScopedSource {
    uri: String,
    direct_connect: bool,
    connector: Arc<dyn Connector>,
    labels: TopologyLabelResolver,
}

impl RequestScopedSource {
    /// Create a source connecting to `uri` on every scrape.
    pub fn new(uri: impl Into<String>, direct_connect: bool, connector: Arc<dyn Connector>) -> Self {
        Self {
            uri: uri.into(),
            direct_connect,
            connector,
            labels: TopologyLabelResolver::new(),
        }
    }
}

#[async_trait]
impl ConnectionSource for RequestScopedSource {
    fn name(&self) -> &'static str {
        "request_scoped"
    }

    async fn acquire(&self) -> Result<Lease, ScrapeError> {
        let address = Address::new(self.uri.clone());
        let connection = self
            .connector
            .connect(&self.uri, self.direct_connect)
            .await
            .map_err(|e| ScrapeError::Connect(Error::connect(address.to_string(), e)))?;

        let labels = match self.labels.resolve(connection.as_ref()).await {
            Ok(labels) => labels,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(address = %address, error = %close_err, "error closing request connection");
                }
                return Err(ScrapeError::Topology(e));
            }
        };

        Ok(Lease::scoped(NodeHandle {
            address,
            role: NodeRole::Direct,
            connection,
            labels,
        }))
    }
}
