//! Replica-set status unit.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use tracing::debug;

use super::{bson_number, gauge_desc, CollectorUnit, GaugeSet};
use crate::connection::{ConnectionError, SharedConnection};
use crate::error::{Error, Result};
use crate::topology::LabelSet;

const NAME: &str = "replset_status";

const MEMBERS: &str = "mongodb_rs_members";
const MEMBERS_HELP: &str = "Number of members in the replica set.";
const MY_STATE: &str = "mongodb_rs_my_state";
const MY_STATE_HELP: &str = "State of the queried member (1 primary, 2 secondary, 7 arbiter).";
const MEMBER_STATE: &str = "mongodb_rs_member_state";
const MEMBER_HEALTH: &str = "mongodb_rs_member_health";
const MEMBER_UPTIME: &str = "mongodb_rs_member_uptime_seconds";
const COMPAT_MY_STATE: &str = "mongodb_mongod_replset_my_state";

const MEMBER_LABEL: &str = "member_idx";

/// True if the node reported that it is not part of a replica set.
fn is_not_replicated(err: &ConnectionError) -> bool {
    match err {
        ConnectionError::CommandFailed { message, .. } => {
            message.contains("NoReplicationEnabled") || message.contains("not running with --replSet")
        }
        _ => false,
    }
}

/// Reports `replSetGetStatus` as replica-set and per-member gauges.
pub struct ReplSetStatusCollector {
    conn: SharedConnection,
    labels: LabelSet,
    compatible_mode: bool,
}

impl ReplSetStatusCollector {
    /// Create the unit for one node.
    pub fn new(conn: SharedConnection, labels: LabelSet) -> Self {
        Self {
            conn,
            labels,
            compatible_mode: false,
        }
    }

    /// Also emit the legacy metric names.
    pub fn with_compatible_mode(mut self, enabled: bool) -> Self {
        self.compatible_mode = enabled;
        self
    }
}

#[async_trait]
impl CollectorUnit for ReplSetStatusCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self) -> Vec<Desc> {
        [
            gauge_desc(MEMBERS, MEMBERS_HELP, &[], &self.labels),
            gauge_desc(MY_STATE, MY_STATE_HELP, &[], &self.labels),
        ]
        .into_iter()
        .filter_map(|d| d.ok())
        .collect()
    }

    async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let status = match self
            .conn
            .run_command("admin", doc! { "replSetGetStatus": 1 })
            .await
        {
            Ok(status) => status,
            Err(e) if is_not_replicated(&e) => {
                debug!(address = self.conn.identifier(), "replication not enabled");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::collector(NAME, e.to_string())),
        };

        let mut gauges = GaugeSet::new(&self.labels);
        let members: Vec<_> = status
            .get_array("members")
            .map(|m| m.iter().filter_map(Bson::as_document).collect())
            .unwrap_or_default();
        gauges.set(MEMBERS, MEMBERS_HELP, &[], members.len() as f64)?;

        let my_state = status.get("myState").and_then(bson_number);
        if let Some(state) = my_state {
            gauges.set(MY_STATE, MY_STATE_HELP, &[], state)?;
            if self.compatible_mode {
                gauges.set(
                    COMPAT_MY_STATE,
                    "An integer between 0 and 10 that represents the replica state of the current member.",
                    &[],
                    state,
                )?;
            }
        }

        for member in members {
            let Ok(name) = member.get_str("name") else {
                continue;
            };
            let label = [(MEMBER_LABEL, name)];
            if let Some(v) = member.get("state").and_then(bson_number) {
                gauges.set(MEMBER_STATE, "State of the member.", &label, v)?;
            }
            if let Some(v) = member.get("health").and_then(bson_number) {
                gauges.set(MEMBER_HEALTH, "Whether the member is up (1) or down (0).", &label, v)?;
            }
            if let Some(v) = member.get("uptime").and_then(bson_number) {
                gauges.set(MEMBER_UPTIME, "Seconds the member has been online.", &label, v)?;
            }
        }

        Ok(gauges.into_families())
    }
}
