//! The exporter: connection strategy, topology and scrape assembly.
//!
//! A scrape acquires a [`Lease`] from the configured [`ConnectionSource`],
//! builds one isolated registry per leased node, prepends the process
//! registry and encodes everything gathered. A node whose collection fails
//! only loses its own samples.
//!
//! # Example
//!
//! ```rust,ignore
//! use mongodb_exporter::config::Options;
//! use mongodb_exporter::exporter::ExporterBuilder;
//!
//! let exporter = ExporterBuilder::new(Options::load(None)?).build().await?;
//! let body = exporter.scrape().await?;
//! ```

mod builder;
mod source;

pub use builder::ExporterBuilder;
pub use source::{ConnectionSource, Lease, PooledSource, RequestScopedSource};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::metrics::{
    encode_text, ExporterMetrics, Gatherers, ProcessGatherer, RegistryBuilder, CAUSE_CONNECT,
    CAUSE_ENCODING, CAUSE_GATHERING, CAUSE_TOPOLOGY,
};
use crate::topology::{ClusterTopology, ConnectionTable, RefreshLoop};

/// A scrape that could not produce any response body.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The request-scoped connection could not be opened.
    #[error("An error has occurred while connecting to MongoDB:\n\n{0}")]
    Connect(#[source] Error),

    /// Labels for the request-scoped connection could not be resolved.
    #[error("An error has occurred while getting topology info:\n\n{0}")]
    Topology(#[source] Error),

    /// The gathered families could not be encoded.
    #[error("An error has occurred while encoding metrics:\n\n{0}")]
    Encode(#[source] Error),
}

impl ScrapeError {
    /// Self-metric cause label for this error.
    pub fn cause(&self) -> &'static str {
        match self {
            ScrapeError::Connect(_) => CAUSE_CONNECT,
            ScrapeError::Topology(_) => CAUSE_TOPOLOGY,
            ScrapeError::Encode(_) => CAUSE_ENCODING,
        }
    }
}

/// Serves scrapes for one deployment.
pub struct Exporter {
    source: Box<dyn ConnectionSource>,
    builder: RegistryBuilder,
    process: ProcessGatherer,
    metrics: ExporterMetrics,
    table: Arc<ConnectionTable>,
    topology: Option<Arc<ClusterTopology>>,
    refresh_interval: Duration,
}

impl Exporter {
    /// The connection table (empty in request-scoped mode).
    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    /// The exporter's own metrics.
    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Name of the connection strategy in use.
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// The process registry followed by one registry per leased node.
    pub async fn gatherers(&self, lease: &Lease) -> Gatherers {
        let mut gatherers = Gatherers::new();
        gatherers.push(Box::new(self.process.clone()));

        let builds = lease.targets().iter().map(|node| {
            self.builder
                .build(node.connection.clone(), node.labels.clone())
        });
        for (node, registry) in lease.targets().iter().zip(join_all(builds).await) {
            match registry {
                Ok(registry) => gatherers.push(Box::new(registry)),
                Err(e) => {
                    error!(address = %node.address, error = %e, "cannot build registry");
                    self.metrics.record_errors(CAUSE_GATHERING, 1);
                }
            }
        }
        gatherers
    }

    /// Answer one scrape with the text exposition of every gathered family.
    pub async fn scrape(&self) -> Result<Vec<u8>, ScrapeError> {
        let timer = self.metrics.scrape_duration.start_timer();

        let lease = match self.source.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                error!(error = %e, "scrape aborted");
                self.metrics.record_errors(e.cause(), 1);
                return Err(e);
            }
        };
        self.metrics.observe_topology(&self.table);

        let gatherers = self.gatherers(&lease).await;
        debug!(gatherers = gatherers.len(), "gathering");
        let outcome = gatherers.gather().await;
        drop(gatherers);
        lease.release().await;

        for e in &outcome.errors {
            warn!(error = %e, "error gathering metrics");
        }
        self.metrics
            .record_errors(CAUSE_GATHERING, outcome.errors.len());

        let body = encode_text(&outcome.families).map_err(|e| {
            self.metrics.record_errors(CAUSE_ENCODING, 1);
            ScrapeError::Encode(e)
        })?;
        timer.observe_duration();
        Ok(body)
    }

    /// Start the background topology refresh, if this exporter has one.
    pub fn spawn_refresh(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let topology = self.topology.as_ref()?;
        let refresh = RefreshLoop::new(Arc::clone(topology), self.refresh_interval)
            .with_outcome_counter(self.metrics.topology_refreshes.clone());
        Some(refresh.spawn(shutdown))
    }

    /// Close every pooled connection.
    pub async fn shutdown(&self) {
        self.table.close_all().await;
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("source", &self.source.name())
            .field("table", &self.table)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}
