//! Gathering several registries into one response.
//!
//! Gatherers run concurrently. A gatherer that fails only loses its own
//! samples; its errors are returned next to the merged families of everyone
//! else.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::map::Entry;
use indexmap::IndexMap;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Families gathered from one or more sources, plus what went wrong.
#[derive(Debug, Default)]
pub struct GatherOutcome {
    /// Merged families, sorted by name
    pub families: Vec<MetricFamily>,
    /// Per-source errors; the families above exclude what failed
    pub errors: Vec<Error>,
}

/// Something that can produce metric families on demand.
#[async_trait]
pub trait Gatherer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce the current families.
    async fn gather(&self) -> GatherOutcome;
}

/// The process's own registry as a gatherer.
#[derive(Clone)]
pub struct ProcessGatherer {
    registry: Registry,
}

impl ProcessGatherer {
    /// Wrap a registry.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Gatherer for ProcessGatherer {
    fn name(&self) -> &str {
        "process"
    }

    async fn gather(&self) -> GatherOutcome {
        GatherOutcome {
            families: self.registry.gather(),
            errors: Vec::new(),
        }
    }
}

/// An ordered list of gatherers merged into one response.
#[derive(Default)]
pub struct Gatherers {
    list: Vec<Box<dyn Gatherer>>,
}

impl Gatherers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a gatherer.
    pub fn push(&mut self, gatherer: Box<dyn Gatherer>) {
        self.list.push(gatherer);
    }

    /// Number of gatherers.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// True if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Names in list order.
    pub fn names(&self) -> Vec<&str> {
        self.list.iter().map(|g| g.name()).collect()
    }

    /// Gather every source concurrently and merge, continuing past errors.
    pub async fn gather(&self) -> GatherOutcome {
        let outcomes = join_all(self.list.iter().map(|g| g.gather())).await;

        let mut errors = Vec::new();
        let mut batches = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            errors.extend(outcome.errors);
            batches.push(outcome.families);
        }

        let mut merged = merge_families(batches);
        errors.append(&mut merged.errors);
        merged.errors = errors;
        merged
    }
}

impl std::fmt::Debug for Gatherers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatherers")
            .field("names", &self.names())
            .finish()
    }
}

fn label_key(metric: &prometheus::proto::Metric) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = metric
        .get_label()
        .iter()
        .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
        .collect();
    key.sort();
    key
}

/// Merge families with the same name.
///
/// A family whose type differs from an earlier family of the same name is
/// dropped, and so is a sample repeating a label set already seen under
/// that name. Both are reported as errors.
pub fn merge_families(batches: Vec<Vec<MetricFamily>>) -> GatherOutcome {
    let mut merged: IndexMap<String, MetricFamily> = IndexMap::new();
    let mut seen: HashSet<(String, Vec<(String, String)>)> = HashSet::new();
    let mut errors = Vec::new();

    for family in batches.into_iter().flatten() {
        let name = family.get_name().to_string();
        let target = match merged.entry(name.clone()) {
            Entry::Occupied(e) => {
                let existing = e.into_mut();
                if existing.get_field_type() != family.get_field_type() {
                    errors.push(Error::Metrics(prometheus::Error::Msg(format!(
                        "family {name} has type {:?}, previously gathered as {:?}",
                        family.get_field_type(),
                        existing.get_field_type()
                    ))));
                    continue;
                }
                existing
            }
            Entry::Vacant(e) => {
                let mut empty = family.clone();
                empty.clear_metric();
                e.insert(empty)
            }
        };

        for metric in family.get_metric() {
            if !seen.insert((name.clone(), label_key(metric))) {
                errors.push(Error::Metrics(prometheus::Error::Msg(format!(
                    "family {name} has a repeated label set {:?}",
                    label_key(metric)
                ))));
                continue;
            }
            target.mut_metric().push(metric.clone());
        }
    }

    merged.sort_keys();
    GatherOutcome {
        families: merged.into_values().filter(|f| !f.get_metric().is_empty()).collect(),
        errors,
    }
}

/// Encode families in the text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    Ok(buffer)
}
