//! The exporter's own metrics.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::error::Result;
use crate::topology::{ConnectionTable, NodeRole};

/// Error cause: a gatherer failed during a scrape.
pub const CAUSE_GATHERING: &str = "gathering";
/// Error cause: the merged response could not be encoded.
pub const CAUSE_ENCODING: &str = "encoding";
/// Error cause: a request-scoped connection could not be opened.
pub const CAUSE_CONNECT: &str = "connect";
/// Error cause: labels for a request-scoped connection could not be resolved.
pub const CAUSE_TOPOLOGY: &str = "topology";

/// Self metrics registered in the process registry.
#[derive(Clone, Debug)]
pub struct ExporterMetrics {
    /// Scrape errors by cause.
    pub scrape_errors: IntCounterVec,
    /// Time spent answering a scrape.
    pub scrape_duration: Histogram,
    /// Known nodes by role, updated on every scrape.
    pub topology_nodes: IntGaugeVec,
    /// Background refresh passes by result.
    pub topology_refreshes: IntCounterVec,
}

impl ExporterMetrics {
    /// Create the metrics and register them into `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        let scrape_errors = IntCounterVec::new(
            Opts::new(
                "mongodb_exporter_scrape_errors_total",
                "Errors encountered while answering scrapes.",
            ),
            &["cause"],
        )?;
        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "mongodb_exporter_scrape_duration_seconds",
                "Time spent answering a scrape.",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let topology_nodes = IntGaugeVec::new(
            Opts::new(
                "mongodb_exporter_topology_nodes",
                "Nodes currently held in the connection table.",
            ),
            &["role"],
        )?;
        let topology_refreshes = IntCounterVec::new(
            Opts::new(
                "mongodb_exporter_topology_refresh_total",
                "Background topology refresh passes.",
            ),
            &["result"],
        )?;

        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(topology_nodes.clone()))?;
        registry.register(Box::new(topology_refreshes.clone()))?;

        Ok(Self {
            scrape_errors,
            scrape_duration,
            topology_nodes,
            topology_refreshes,
        })
    }

    /// Count `n` errors of `cause`.
    pub fn record_errors(&self, cause: &str, n: usize) {
        if n > 0 {
            self.scrape_errors
                .with_label_values(&[cause])
                .inc_by(n as u64);
        }
    }

    /// Set the node gauge from the current table contents.
    pub fn observe_topology(&self, table: &ConnectionTable) {
        let counts = table.count_by_role();
        for role in [NodeRole::Router, NodeRole::ShardMember, NodeRole::Direct] {
            let n = counts.get(&role).copied().unwrap_or(0);
            self.topology_nodes
                .with_label_values(&[role.as_str()])
                .set(n as i64);
        }
    }
}
