//! Isolated per-node registry of collector units.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::proto::MetricFamily;
use tracing::debug;

use super::gather::{merge_families, GatherOutcome, Gatherer};
use crate::collectors::CollectorUnit;
use crate::error::{Error, Result};

/// The collector units of exactly one node.
///
/// Registries are never shared between nodes, so the constant labels of one
/// node cannot collide with those of another inside a registry.
pub struct NodeRegistry {
    name: String,
    units: Vec<Box<dyn CollectorUnit>>,
    desc_ids: HashSet<u64>,
}

impl NodeRegistry {
    /// Create an empty registry for the node called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
            desc_ids: HashSet::new(),
        }
    }

    /// Add a unit.
    ///
    /// Fails if a unit with the same name, or a unit describing an already
    /// described family, is registered.
    pub fn register(&mut self, unit: Box<dyn CollectorUnit>) -> Result<()> {
        if self.units.iter().any(|u| u.name() == unit.name()) {
            return Err(Error::Metrics(prometheus::Error::AlreadyReg));
        }
        let ids: Vec<u64> = unit.describe().iter().map(|d| d.id).collect();
        if ids.iter().any(|id| self.desc_ids.contains(id)) {
            return Err(Error::Metrics(prometheus::Error::AlreadyReg));
        }
        self.desc_ids.extend(ids);
        debug!(node = %self.name, collector = unit.name(), "registered collector");
        self.units.push(unit);
        Ok(())
    }

    /// Names of the registered units, in registration order.
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True if no unit is registered.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[async_trait]
impl Gatherer for NodeRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn gather(&self) -> GatherOutcome {
        let results = join_all(self.units.iter().map(|unit| unit.collect())).await;

        let mut batches: Vec<Vec<MetricFamily>> = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (unit, result) in self.units.iter().zip(results) {
            match result {
                Ok(families) => batches.push(families),
                Err(e) => {
                    debug!(node = %self.name, collector = unit.name(), error = %e, "collector failed");
                    errors.push(e);
                }
            }
        }

        let mut outcome = merge_families(batches);
        errors.append(&mut outcome.errors);
        outcome.errors = errors;
        outcome
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("name", &self.name)
            .field("units", &self.unit_names())
            .finish()
    }
}
