//! Topology labels and role detection for a connected node.

use mongodb::bson::{doc, Bson, Document};
use tracing::debug;

use super::{LabelSet, NodeType};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Replica-set name label.
pub const REPLSET_NAME_LABEL: &str = "rs_nm";
/// Numeric member state label.
pub const REPLSET_STATE_LABEL: &str = "rs_state";
/// Cluster role label (`mongos`, `shardsvr`, `configsvr`).
pub const CLUSTER_ROLE_LABEL: &str = "cl_role";

const STATE_PRIMARY: &str = "1";
const STATE_SECONDARY: &str = "2";
const STATE_ARBITER: &str = "7";

/// Derives the label set describing a node's place in the cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyLabelResolver;

impl TopologyLabelResolver {
    /// Create a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Query the node and build its labels.
    ///
    /// Fails only if the node does not answer `isMaster`. The cluster role is
    /// best effort since `getCmdLineOpts` needs extra privileges.
    pub async fn resolve(&self, conn: &dyn Connection) -> Result<LabelSet> {
        let reply = conn
            .run_command("admin", doc! { "isMaster": 1 })
            .await
            .map_err(|e| Error::Topology(format!("{}: {e}", conn.identifier())))?;

        let mut labels = labels_from_is_master(&reply);
        if labels.get(CLUSTER_ROLE_LABEL).is_none() {
            match conn.run_command("admin", doc! { "getCmdLineOpts": 1 }).await {
                Ok(opts) => {
                    if let Some(role) = cluster_role(&opts) {
                        labels.insert(CLUSTER_ROLE_LABEL, role);
                    }
                }
                Err(e) => {
                    debug!(address = conn.identifier(), error = %e, "cluster role unavailable")
                }
            }
        }
        Ok(labels)
    }
}

fn labels_from_is_master(reply: &Document) -> LabelSet {
    let mut labels = LabelSet::new();

    if let Ok(name) = reply.get_str("setName") {
        labels.insert(REPLSET_NAME_LABEL, name);
    }

    let flag = |key: &str| reply.get_bool(key).unwrap_or(false);
    let state = if flag("arbiterOnly") {
        Some(STATE_ARBITER)
    } else if flag("secondary") {
        Some(STATE_SECONDARY)
    } else if flag("ismaster") && reply.contains_key("setName") {
        Some(STATE_PRIMARY)
    } else {
        None
    };
    if let Some(state) = state {
        labels.insert(REPLSET_STATE_LABEL, state);
    }

    if NodeType::from_is_master(reply).is_router() {
        labels.insert(CLUSTER_ROLE_LABEL, NodeType::Mongos.as_str());
    }
    labels
}

fn cluster_role(opts: &Document) -> Option<String> {
    let parsed = opts.get_document("parsed").ok()?;
    let sharding = parsed.get_document("sharding").ok()?;
    match sharding.get("clusterRole") {
        Some(Bson::String(role)) if !role.is_empty() => Some(role.clone()),
        _ => None,
    }
}

/// Classify a node with one `isMaster` round trip.
pub async fn detect_node_type(conn: &dyn Connection) -> Result<NodeType> {
    conn.run_command("admin", doc! { "isMaster": 1 })
        .await
        .map(|reply| NodeType::from_is_master(&reply))
        .map_err(|e| Error::RoleDetection(format!("{}: {e}", conn.identifier())))
}
