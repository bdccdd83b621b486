//! Always-on liveness unit.

use async_trait::async_trait;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use tracing::debug;

use super::{gauge_desc, CollectorUnit, GaugeSet};
use crate::connection::SharedConnection;
use crate::error::Result;
use crate::topology::LabelSet;

const UP: &str = "mongodb_up";
const UP_HELP: &str = "Whether MongoDB is up.";

/// Reports `mongodb_up`: 1 when the node answers a ping, 0 otherwise.
pub struct GeneralCollector {
    conn: SharedConnection,
    labels: LabelSet,
}

impl GeneralCollector {
    /// Create the unit for one node.
    pub fn new(conn: SharedConnection, labels: LabelSet) -> Self {
        Self { conn, labels }
    }
}

#[async_trait]
impl CollectorUnit for GeneralCollector {
    fn name(&self) -> &'static str {
        "general"
    }

    fn describe(&self) -> Vec<Desc> {
        gauge_desc(UP, UP_HELP, &[], &self.labels)
            .into_iter()
            .collect()
    }

    async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let up = match self.conn.ping().await {
            Ok(()) => 1.0,
            Err(e) => {
                debug!(address = self.conn.identifier(), error = %e, "node did not answer ping");
                0.0
            }
        };

        let mut gauges = GaugeSet::new(&self.labels);
        gauges.set(UP, UP_HELP, &[], up)?;
        Ok(gauges.into_families())
    }
}
