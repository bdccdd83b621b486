//! Collection statistics unit.

use async_trait::async_trait;
use mongodb::bson::doc;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use tracing::warn;

use super::{bson_number, collection_targets, metric_name, CollectorUnit, GaugeSet, NAMESPACE};
use crate::connection::SharedConnection;
use crate::error::Result;
use crate::topology::LabelSet;

/// Runs `collStats` for each configured collection and reports its
/// top-level numeric fields.
pub struct CollStatsCollector {
    conn: SharedConnection,
    labels: LabelSet,
    collections: Vec<String>,
    discovering_mode: bool,
}

impl CollStatsCollector {
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

#[async_trait]
impl CollectorUnit for CollStatsCollector {
    fn name(&self) -> &'static str {
        "collstats"
    }

    fn describe(&self) -> Vec<Desc> {
        Vec::new()
    }

    async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let targets =
            collection_targets(self.conn.as_ref(), &self.collections, self.discovering_mode).await;

        let mut gauges = GaugeSet::new(&self.labels);
        for (database, collection) in &targets {
            let stats = match self
                .conn
                .run_command(database, doc! { "collStats": collection.as_str(), "scale": 1 })
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(database = %database, collection = %collection, error = %e, "collStats failed");
                    continue;
                }
            };

            let labels = [("database", database.as_str()), ("collection", collection.as_str())];
            for (field, value) in &stats {
                if field == "ok" {
                    continue;
                }
                if let Some(v) = bson_number(value) {
                    let name = metric_name(&[NAMESPACE, "collstats", field]);
                    gauges.set(&name, &format!("collStats.{field}"), &labels, v)?;
                }
            }
        }

        Ok(gauges.into_families())
    }
}
