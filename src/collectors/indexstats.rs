//! Index usage statistics unit.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use tracing::warn;

use super::{bson_number, collection_targets, cursor_batch, CollectorUnit, GaugeSet};
use crate::connection::SharedConnection;
use crate::error::Result;
use crate::topology::LabelSet;

const ACCESSES: &str = "mongodb_indexstats_accesses_ops";
const ACCESSES_HELP: &str = "Number of operations that used the index.";

/// Runs the `$indexStats` aggregation for each configured collection.
pub struct IndexStatsCollector {
    conn: SharedConnection,
    labels: LabelSet,
    collections: Vec<String>,
    discovering_mode: bool,
}

impl IndexStatsCollector {
    /// Create the unit for `collections` (`db.collection` or bare `db`).
    pub fn new(conn: SharedConnection, labels: LabelSet, collections: Vec<String>) -> Self {
        Self {
            conn,
            labels,
            collections,
            discovering_mode: false,
        }
    }

    /// Expand bare database names into their collections.
    pub fn with_discovering_mode(mut self, enabled: bool) -> Self {
        self.discovering_mode = enabled;
        self
    }
}

fn index_accesses(index: &Document) -> Option<(&str, f64)> {
    let name = index.get_str("name").ok()?;
    let ops = index.get_document("accesses").ok()?.get("ops")?;
    Some((name, bson_number(ops)?))
}

#[async_trait]
impl CollectorUnit for IndexStatsCollector {
    fn name(&self) -> &'static str {
        "indexstats"
    }

    fn describe(&self) -> Vec<Desc> {
        Vec::new()
    }

    async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let targets =
            collection_targets(self.conn.as_ref(), &self.collections, self.discovering_mode).await;

        let mut gauges = GaugeSet::new(&self.labels);
        for (database, collection) in &targets {
            let command = doc! {
                "aggregate": collection.as_str(),
                "pipeline": [ { "$indexStats": {} } ],
                "cursor": {},
            };
            let reply = match self.conn.run_command(database, command).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(database = %database, collection = %collection, error = %e, "$indexStats failed");
                    continue;
                }
            };

            for index in cursor_batch(&reply) {
                if let Some((key_name, ops)) = index_accesses(&index) {
                    let labels = [
                        ("database", database.as_str()),
                        ("collection", collection.as_str()),
                        ("key_name", key_name),
                    ];
                    gauges.set(ACCESSES, ACCESSES_HELP, &labels, ops)?;
                }
            }
        }

        Ok(gauges.into_families())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_accesses() {
        let index = doc! { "name": "_id_", "accesses": { "ops": 42_i64 } };
        assert_eq!(index_accesses(&index), Some(("_id_", 42.0)));
        assert_eq!(index_accesses(&doc! { "name": "x" }), None);
    }
}
