//! Per-node metric collector units.
//!
//! A unit holds one live connection and the label set of its node. Every
//! sample it produces carries that label set as constant labels, so samples
//! of different nodes stay apart once merged into one response.
//!
//! Units are selected per node by
//! [`RegistryBuilder`](crate::metrics::RegistryBuilder) and run inside a
//! [`NodeRegistry`](crate::metrics::NodeRegistry). A unit future is dropped
//! when its scrape request goes away, which also drops the node queries it
//! has in flight.

mod collstats;
mod diagnostic;
mod general;
mod indexstats;
mod replset;

pub use collstats::CollStatsCollector;
pub use diagnostic::DiagnosticDataCollector;
pub use general::GeneralCollector;
pub use indexstats::IndexStatsCollector;
pub use replset::ReplSetStatusCollector;

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::map::Entry;
use indexmap::IndexMap;
use mongodb::bson::{doc, Bson, Document};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use tracing::warn;

use crate::connection::Connection;
use crate::error::Result;
use crate::topology::LabelSet;

/// Prefix of every metric produced for a node.
pub const NAMESPACE: &str = "mongodb";

/// A pluggable source of samples for one node.
#[async_trait]
pub trait CollectorUnit: Send + Sync {
    /// Unit name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Descriptors of the families this unit always emits.
    ///
    /// Units whose families depend on the server's reply return an empty
    /// list and are not checked for collisions at registration.
    fn describe(&self) -> Vec<Desc>;

    /// Query the node and return its samples.
    async fn collect(&self) -> Result<Vec<MetricFamily>>;
}

// ============================================================================
// Sample building
// ============================================================================

/// Accumulates gauge samples by family name for one node.
pub struct GaugeSet {
    const_labels: HashMap<String, String>,
    gauges: IndexMap<String, GaugeVec>,
}

impl GaugeSet {
    /// Start a set whose samples all carry `labels`.
    pub fn new(labels: &LabelSet) -> Self {
        Self {
            const_labels: labels.to_hashmap(),
            gauges: IndexMap::new(),
        }
    }

    /// Set one sample. The first call for a name fixes its help text and
    /// label names.
    pub fn set(
        &mut self,
        name: &str,
        help: &str,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<()> {
        let gauge = match self.gauges.entry(name.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let names: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
                let opts = Opts::new(name, help).const_labels(self.const_labels.clone());
                e.insert(GaugeVec::new(opts, &names)?)
            }
        };
        let values: Vec<&str> = labels.iter().map(|(_, v)| *v).collect();
        gauge.get_metric_with_label_values(&values)?.set(value);
        Ok(())
    }

    /// Number of distinct families.
    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    /// True if nothing was set.
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    /// Finish into families, in first-set order.
    pub fn into_families(self) -> Vec<MetricFamily> {
        self.gauges.values().flat_map(|g| g.collect()).collect()
    }
}

/// Descriptor of a gauge family carrying `labels` plus `variable` labels.
pub fn gauge_desc(name: &str, help: &str, variable: &[&str], labels: &LabelSet) -> Result<Desc> {
    let variable = variable.iter().map(|s| s.to_string()).collect();
    Ok(Desc::new(
        name.to_string(),
        help.to_string(),
        variable,
        labels.to_hashmap(),
    )?)
}

/// Join name parts and replace characters not allowed in metric names.
pub fn metric_name(parts: &[&str]) -> String {
    let mut name = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if !name.is_empty() {
            name.push('_');
        }
        name.push_str(part);
    }

    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let out = out.trim_end_matches('_').to_string();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{out}")
    } else {
        out
    }
}

/// Numeric value of a BSON scalar. Booleans count as 0 or 1, dates as
/// seconds since the epoch.
pub fn bson_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        Bson::DateTime(v) => Some(v.timestamp_millis() as f64 / 1000.0),
        Bson::Timestamp(v) => Some(f64::from(v.time)),
        _ => None,
    }
}

/// Walk `document` depth first and yield `(path, value)` for every numeric
/// leaf. Path segments are joined with `_`; arrays are not descended.
pub fn flatten_numeric(document: &Document, prefix: &str, out: &mut Vec<(String, f64)>) {
    for (key, value) in document {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };
        match value {
            Bson::Document(inner) => flatten_numeric(inner, &path, out),
            other => {
                if let Some(v) = bson_number(other) {
                    out.push((path, v));
                }
            }
        }
    }
}

// ============================================================================
// Collection targets
// ============================================================================

/// Expand configured `db.collection` entries into `(database, collection)`
/// pairs. Bare database names are expanded with `listCollections` when
/// `discovering` is set and skipped otherwise.
pub async fn collection_targets(
    conn: &dyn Connection,
    entries: &[String],
    discovering: bool,
) -> Vec<(String, String)> {
    let mut targets = Vec::new();
    for entry in entries {
        match entry.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => {
                targets.push((db.to_string(), coll.to_string()));
            }
            _ if discovering && !entry.is_empty() => {
                match list_collections(conn, entry).await {
                    Ok(names) => targets.extend(names.into_iter().map(|c| (entry.clone(), c))),
                    Err(e) => warn!(database = %entry, error = %e, "cannot list collections"),
                }
            }
            _ => warn!(entry = %entry, "ignoring collection entry without a database"),
        }
    }
    targets.dedup();
    targets
}

async fn list_collections(
    conn: &dyn Connection,
    database: &str,
) -> crate::connection::ConnectionResult<Vec<String>> {
    let reply = conn
        .run_command(database, doc! { "listCollections": 1, "nameOnly": true })
        .await?;
    Ok(cursor_batch(&reply)
        .iter()
        .filter_map(|c| c.get_str("name").ok())
        .filter(|name| !name.starts_with("system."))
        .map(str::to_string)
        .collect())
}

/// Documents of the first batch of a cursor reply.
pub fn cursor_batch(reply: &Document) -> Vec<Document> {
    reply
        .get_document("cursor")
        .and_then(|c| c.get_array("firstBatch"))
        .map(|batch| {
            batch
                .iter()
                .filter_map(|b| b.as_document().cloned())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_metric_name_sanitizes() {
        assert_eq!(
            metric_name(&["mongodb", "ss", "opcounters", "insert"]),
            "mongodb_ss_opcounters_insert"
        );
        assert_eq!(
            metric_name(&["mongodb", "ss", "wt", "cache", "bytes read into cache"]),
            "mongodb_ss_wt_cache_bytes_read_into_cache"
        );
        assert_eq!(metric_name(&["local.oplog.rs", "stats"]), "local_oplog_rs_stats");
        assert_eq!(metric_name(&["9lives"]), "_9lives");
        assert_eq!(metric_name(&["a", "", "b-"]), "a_b");
    }

    #[test]
    fn test_flatten_numeric() {
        let document = doc! {
            "uptime": 12.5,
            "ok": true,
            "host": "h1",
            "connections": { "current": 3, "available": 838_857_i64 },
            "list": [1, 2],
        };
        let mut out = Vec::new();
        flatten_numeric(&document, "", &mut out);
        assert_eq!(
            out,
            vec![
                ("uptime".to_string(), 12.5),
                ("ok".to_string(), 1.0),
                ("connections_current".to_string(), 3.0),
                ("connections_available".to_string(), 838_857.0),
            ]
        );
    }

    #[test]
    fn test_gauge_set_carries_node_labels() {
        let labels = LabelSet::new().with("cid", "h1:27018");
        let mut set = GaugeSet::new(&labels);
        set.set("mongodb_up", "up", &[], 1.0).unwrap();
        set.set("mongodb_collstats_count", "count", &[("collection", "a")], 3.0)
            .unwrap();
        set.set("mongodb_collstats_count", "count", &[("collection", "b")], 4.0)
            .unwrap();
        assert_eq!(set.len(), 2);

        let families = set.into_families();
        assert_eq!(families[0].get_name(), "mongodb_up");
        assert_eq!(families[1].get_metric().len(), 2);
        let pair = &families[0].get_metric()[0].get_label()[0];
        assert_eq!(pair.get_name(), "cid");
        assert_eq!(pair.get_value(), "h1:27018");
    }

    #[test]
    fn test_gauge_set_rejects_label_mismatch() {
        let mut set = GaugeSet::new(&LabelSet::new());
        set.set("x", "x", &[("a", "1")], 1.0).unwrap();
        assert!(set.set("x", "x", &[], 1.0).is_err());
    }

    #[test]
    fn test_cursor_batch() {
        let reply = doc! {
            "cursor": { "firstBatch": [ { "name": "orders" }, { "name": "users" } ] }
        };
        assert_eq!(cursor_batch(&reply).len(), 2);
        assert!(cursor_batch(&doc! {}).is_empty());
    }
}
