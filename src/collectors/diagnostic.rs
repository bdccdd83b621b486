//! Diagnostic data unit.
//!
//! Data-bearing nodes are read through `getDiagnosticData`, routers through
//! `serverStatus`. Every numeric leaf becomes one gauge named after its path.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;

use super::{bson_number, flatten_numeric, metric_name, CollectorUnit, GaugeSet, NAMESPACE};
use crate::connection::SharedConnection;
use crate::error::{Error, Result};
use crate::topology::LabelSet;

const NAME: &str = "diagnostic_data";

/// Short prefix used in metric names for a diagnostic section.
fn section_prefix(section: &str) -> &str {
    match section {
        "serverStatus" => "ss",
        "replSetGetStatus" => "rs",
        "systemMetrics" => "sys",
        other => other,
    }
}

/// Turns `getDiagnosticData` (or `serverStatus` on routers) into gauges.
pub struct DiagnosticDataCollector {
    conn: SharedConnection,
    labels: LabelSet,
    router: bool,
    compatible_mode: bool,
    disable_mongos_status: bool,
}

impl DiagnosticDataCollector {
    /// Create the unit for one node.
    pub fn new(conn: SharedConnection, labels: LabelSet) -> Self {
        Self {
            conn,
            labels,
            router: false,
            compatible_mode: false,
            disable_mongos_status: false,
        }
    }

    /// Mark the node as a query router.
    pub fn with_router(mut self, router: bool) -> Self {
        self.router = router;
        self
    }

    /// Also emit the legacy metric names.
    pub fn with_compatible_mode(mut self, enabled: bool) -> Self {
        self.compatible_mode = enabled;
        self
    }

    /// Skip `serverStatus` on routers.
    pub fn with_mongos_status_disabled(mut self, disabled: bool) -> Self {
        self.disable_mongos_status = disabled;
        self
    }

    async fn fetch(&self) -> Result<Option<Document>> {
        if self.router {
            if self.disable_mongos_status {
                return Ok(None);
            }
            let status = self
                .conn
                .run_command("admin", doc! { "serverStatus": 1 })
                .await
                .map_err(|e| Error::collector(NAME, e.to_string()))?;
            return Ok(Some(doc! { "serverStatus": status }));
        }

        let reply = self
            .conn
            .run_command("admin", doc! { "getDiagnosticData": 1 })
            .await
            .map_err(|e| Error::collector(NAME, e.to_string()))?;
        reply
            .get_document("data")
            .cloned()
            .map(Some)
            .map_err(|_| Error::collector(NAME, "reply has no 'data' document"))
    }
}

#[async_trait]
impl CollectorUnit for DiagnosticDataCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self) -> Vec<Desc> {
        Vec::new()
    }

    async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let Some(data) = self.fetch().await? else {
            return Ok(Vec::new());
        };

        let mut gauges = GaugeSet::new(&self.labels);
        let mut samples = Vec::new();
        for (section, value) in &data {
            let Bson::Document(inner) = value else {
                continue;
            };
            samples.clear();
            flatten_numeric(inner, "", &mut samples);
            let prefix = section_prefix(section);
            for (path, value) in &samples {
                let name = metric_name(&[NAMESPACE, prefix, path]);
                let help = format!("{section}.{path}");
                gauges.set(&name, &help, &[], *value)?;
            }
        }

        if self.compatible_mode {
            let uptime = data
                .get_document("serverStatus")
                .ok()
                .and_then(|status| status.get("uptime"))
                .and_then(bson_number);
            if let Some(uptime) = uptime {
                gauges.set(
                    "mongodb_instance_uptime_seconds",
                    "The value of the uptime field in the output of serverStatus.",
                    &[],
                    uptime,
                )?;
            }
        }

        Ok(gauges.into_families())
    }
}
