//! Shard map resolution.
//!
//! A router is asked for its shard map (`getShardMap`). Shards whose name
//! matches the configured prefix are expanded into member addresses and
//! every member is connected individually.

use std::collections::BTreeSet;
use std::sync::Arc;

use mongodb::bson::{doc, Bson, Document};
use regex::Regex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};
use url::Url;

use super::discovery::DiscoveryReport;
use super::labels::TopologyLabelResolver;
use super::table::close_connections;
use super::{
    member_address, parse_base_uri, Address, ConnectionTable, NodeRole, ShardMap, CID_LABEL,
};
use crate::connection::{Connection, Connector};
use crate::error::{Error, Result};

/// Compile a shard-name prefix into an anchored pattern.
///
/// An empty prefix matches every shard.
pub fn shard_name_pattern(prefix: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{prefix})"))?)
}

/// Extract the member lists of matching shards from a `getShardMap` reply.
///
/// Entries whose value equals their own name have no members and are
/// skipped, as are shards the pattern does not match.
pub fn parse_shard_map(reply: &Document, pattern: &Regex) -> Result<ShardMap> {
    let map = reply
        .get_document("map")
        .map_err(|_| Error::ShardMap("reply has no 'map' document".to_string()))?;

    let mut shards = ShardMap::new();
    for (name, value) in map {
        if !pattern.is_match(name) {
            continue;
        }
        let members = match value {
            Bson::String(s) => s,
            other => {
                return Err(Error::ShardMap(format!(
                    "members of shard '{name}' are not a string: {other}"
                )))
            }
        };
        if members == name {
            continue;
        }

        let list = members
            .strip_prefix(name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(members.as_str());
        let hosts: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if !hosts.is_empty() {
            shards.insert(name.clone(), hosts);
        }
    }
    Ok(shards)
}

/// Connects shard members listed by a router and keeps their table entries
/// in line with the latest shard map.
pub struct ShardMapResolver {
    base: Url,
    pattern: Regex,
    connector: Arc<dyn Connector>,
    labels: TopologyLabelResolver,
    table: Arc<ConnectionTable>,
    pass: AsyncMutex<()>,
}

impl ShardMapResolver {
    /// Create a resolver. Member addresses reuse the credentials and options
    /// of `base_uri`.
    pub fn new(
        base_uri: &str,
        pattern: Regex,
        connector: Arc<dyn Connector>,
        table: Arc<ConnectionTable>,
    ) -> Result<Self> {
        Ok(Self {
            base: parse_base_uri(base_uri)?,
            pattern,
            connector,
            labels: TopologyLabelResolver::new(),
            table,
            pass: AsyncMutex::new(()),
        })
    }

    /// Query `router` for the shard map, filtered by the prefix pattern.
    pub async fn resolve_shards(&self, router: &dyn Connection) -> Result<ShardMap> {
        let reply = router
            .run_command("admin", doc! { "getShardMap": 1 })
            .await
            .map_err(|e| Error::ShardMap(format!("{}: {e}", router.identifier())))?;
        parse_shard_map(&reply, &self.pattern)
    }

    /// Bring the shard-member entries of the table in line with `shards`.
    ///
    /// Members are always connected directly. The first connect or label
    /// failure ends the pass; members added before it stay.
    #[instrument(skip_all, fields(shards = shards.len()))]
    pub async fn reconcile(&self, shards: &ShardMap) -> Result<DiscoveryReport> {
        let mut wanted = Vec::new();
        for (shard, members) in shards {
            for member in members {
                let address = member_address(&self.base, member)?;
                wanted.push((shard.as_str(), member.as_str(), address));
            }
        }
        let keep: BTreeSet<Address> = wanted.iter().map(|(_, _, addr)| addr.clone()).collect();

        let _pass = self.pass.lock().await;
        let mut report = DiscoveryReport::default();

        let evicted = self.table.evict_missing(NodeRole::ShardMember, &keep);
        for address in evicted.addresses() {
            debug!(address = %address, "shard member no longer listed");
            report.evicted.push(address.clone());
        }
        evicted.close().await;

        for (shard, member, address) in wanted {
            if self.table.contains(&address) {
                continue;
            }
            info!(shard, member, "connecting to shard member");
            let connection = self
                .connector
                .connect(address.as_str(), true)
                .await
                .map_err(|e| Error::connect(address.to_string(), e))?;

            let mut labels = match self.labels.resolve(connection.as_ref()).await {
                Ok(labels) => labels,
                Err(e) => {
                    close_connections(vec![(address, connection)]).await;
                    return Err(e);
                }
            };
            labels.insert(CID_LABEL, member);

            match self
                .table
                .try_insert(address.clone(), NodeRole::ShardMember, connection, labels)
            {
                Ok(()) => report.added.push(address),
                Err(rejected) => close_connections(vec![(address, rejected)]).await,
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for ShardMapResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardMapResolver")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}
