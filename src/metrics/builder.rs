//! Choosing collector units for a node.

use tracing::warn;

use super::registry::NodeRegistry;
use crate::collectors::{
    CollStatsCollector, DiagnosticDataCollector, GeneralCollector, IndexStatsCollector,
    ReplSetStatusCollector,
};
use crate::config::CollectorsConfig;
use crate::connection::SharedConnection;
use crate::error::Result;
use crate::topology::{detect_node_type, LabelSet};

/// Assembles one isolated registry per node from the configured collectors
/// and the node's detected type.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    options: CollectorsConfig,
}

impl RegistryBuilder {
    /// Create a builder for the given collector options.
    pub fn new(options: CollectorsConfig) -> Self {
        Self { options }
    }

    /// Collector options in use.
    pub fn options(&self) -> &CollectorsConfig {
        &self.options
    }

    /// Build the registry for one node.
    ///
    /// Role detection costs one `isMaster`. If it fails the node is treated
    /// as not being a router, so replica-set status is still attempted.
    pub async fn build(&self, conn: SharedConnection, labels: LabelSet) -> Result<NodeRegistry> {
        let opts = &self.options;
        let mut registry = NodeRegistry::new(conn.identifier());

        registry.register(Box::new(GeneralCollector::new(conn.clone(), labels.clone())))?;

        let router = match detect_node_type(conn.as_ref()).await {
            Ok(node_type) => node_type.is_router(),
            Err(e) => {
                warn!(
                    address = conn.identifier(),
                    error = %e,
                    "cannot detect node type, assuming it is not a mongos"
                );
                false
            }
        };

        if !opts.collstats_collections.is_empty() {
            let unit = CollStatsCollector::new(
                conn.clone(),
                labels.clone(),
                opts.collstats_collections.clone(),
            )
            .with_discovering_mode(opts.discovering_mode);
            registry.register(Box::new(unit))?;
        }

        if !opts.indexstats_collections.is_empty() {
            let unit = IndexStatsCollector::new(
                conn.clone(),
                labels.clone(),
                opts.indexstats_collections.clone(),
            )
            .with_discovering_mode(opts.discovering_mode);
            registry.register(Box::new(unit))?;
        }

        if !opts.disable_diagnostic_data {
            let unit = DiagnosticDataCollector::new(conn.clone(), labels.clone())
                .with_router(router)
                .with_compatible_mode(opts.compatible_mode)
                .with_mongos_status_disabled(opts.disable_mongos_status);
            registry.register(Box::new(unit))?;
        }

        // replSetGetStatus is not supported through mongos
        if !opts.disable_replicaset_status && !router {
            let unit = ReplSetStatusCollector::new(conn, labels)
                .with_compatible_mode(opts.compatible_mode);
            registry.register(Box::new(unit))?;
        }

        Ok(registry)
    }
}
