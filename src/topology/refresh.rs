//! Topology refresh: one pass, and the background loop repeating it.

use std::sync::Arc;
use std::time::Duration;

use prometheus::IntCounterVec;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::discovery::{DiscoveryReport, RouterDiscoverer};
use super::shards::ShardMapResolver;
use super::{ConnectionTable, NodeRole};
use crate::error::{Error, Result};

/// Default interval between two refresh passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Changes applied by one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Router changes
    pub routers: DiscoveryReport,
    /// Shard member changes
    pub shards: DiscoveryReport,
}

/// The write side of the connection table for a sharded cluster.
#[derive(Debug)]
pub struct ClusterTopology {
    discoverer: RouterDiscoverer,
    shards: ShardMapResolver,
    table: Arc<ConnectionTable>,
}

impl ClusterTopology {
    /// Combine a discoverer and a shard resolver writing to the same table.
    pub fn new(discoverer: RouterDiscoverer, shards: ShardMapResolver) -> Self {
        let table = Arc::clone(discoverer.table());
        Self {
            discoverer,
            shards,
            table,
        }
    }

    /// The table being maintained.
    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    /// Reconcile routers, then re-read the shard map through a live router
    /// and reconcile shard members.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let routers = self.discoverer.discover().await?;

        let router = self
            .table
            .snapshot()
            .into_iter()
            .find(|node| node.role == NodeRole::Router)
            .ok_or_else(|| Error::Topology("no router connected".to_string()))?;
        debug!(router = %router.address, "reading shard map");

        let map = self.shards.resolve_shards(router.connection.as_ref()).await?;
        let shards = self.shards.reconcile(&map).await?;

        Ok(RefreshReport { routers, shards })
    }
}

/// Periodic background refresh, independent of scrapes.
pub struct RefreshLoop {
    topology: Arc<ClusterTopology>,
    interval: Duration,
    outcomes: Option<IntCounterVec>,
}

impl RefreshLoop {
    /// Create a loop refreshing `topology` every `interval`.
    pub fn new(topology: Arc<ClusterTopology>, interval: Duration) -> Self {
        Self {
            topology,
            interval,
            outcomes: None,
        }
    }

    /// Count pass outcomes in a counter with a single `result` label.
    pub fn with_outcome_counter(mut self, counter: IntCounterVec) -> Self {
        self.outcomes = Some(counter);
        self
    }

    /// Run on the current runtime until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// A failed pass is logged and leaves the table as it was; the next pass
    /// runs after the usual interval.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "topology refresh started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.topology.refresh() => result,
            };

            match result {
                Ok(report) => {
                    debug!(
                        routers_added = report.routers.added.len(),
                        routers_evicted = report.routers.evicted.len(),
                        members_added = report.shards.added.len(),
                        members_evicted = report.shards.evicted.len(),
                        "topology refreshed"
                    );
                    self.count("success");
                }
                Err(e) => {
                    error!(error = %e, "topology refresh failed");
                    self.count("failure");
                }
            }
        }
        info!("topology refresh stopped");
    }

    fn count(&self, result: &str) {
        if let Some(counter) = &self.outcomes {
            counter.with_label_values(&[result]).inc();
        }
    }
}
