//! The connection table.
//!
//! Maps each known [`Address`] to its connection and label set. Both halves
//! of an entry live in one value behind one lock, so a reader can never see a
//! connection without its labels. Callers only get snapshots and whole-step
//! mutations; the map itself is never exposed.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Address, LabelSet, NodeRole};
use crate::connection::SharedConnection;

struct TableEntry {
    role: NodeRole,
    connection: SharedConnection,
    labels: LabelSet,
}

/// One table entry as seen by a reader.
#[derive(Clone)]
pub struct NodeHandle {
    /// Node address
    pub address: Address,
    /// How the node entered the table
    pub role: NodeRole,
    /// Live connection
    pub connection: SharedConnection,
    /// Labels for every sample of this node
    pub labels: LabelSet,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("address", &self.address)
            .field("role", &self.role)
            .field("labels", &self.labels)
            .finish()
    }
}

/// Shared, lock-protected map of known nodes.
#[derive(Default)]
pub struct ConnectionTable {
    entries: Mutex<BTreeMap<Address, TableEntry>>,
}

impl ConnectionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the address has an entry.
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.lock().contains_key(address)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Insert a new entry.
    ///
    /// An existing entry is never replaced: the rejected connection is handed
    /// back so the caller can close it.
    pub fn try_insert(
        &self,
        address: Address,
        role: NodeRole,
        connection: SharedConnection,
        labels: LabelSet,
    ) -> Result<(), SharedConnection> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&address) {
            return Err(connection);
        }
        debug!(address = %address, role = %role, "adding node");
        entries.insert(
            address,
            TableEntry {
                role,
                connection,
                labels,
            },
        );
        Ok(())
    }

    /// Consistent copy of every entry: shard members first, then routers,
    /// then the direct node. Address order within a role.
    pub fn snapshot(&self) -> Vec<NodeHandle> {
        let entries = self.entries.lock();
        let mut nodes: Vec<NodeHandle> = entries
            .iter()
            .map(|(address, entry)| NodeHandle {
                address: address.clone(),
                role: entry.role,
                connection: entry.connection.clone(),
                labels: entry.labels.clone(),
            })
            .collect();
        drop(entries);

        nodes.sort_by_key(|node| node.role);
        nodes
    }

    /// Addresses with the given role.
    pub fn addresses(&self, role: NodeRole) -> BTreeSet<Address> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.role == role)
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Number of entries per role.
    pub fn count_by_role(&self) -> BTreeMap<NodeRole, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.lock().values() {
            *counts.entry(entry.role).or_insert(0) += 1;
        }
        counts
    }

    /// Labels of one entry.
    pub fn labels(&self, address: &Address) -> Option<LabelSet> {
        self.entries.lock().get(address).map(|e| e.labels.clone())
    }

    /// Connection of one entry.
    pub fn connection(&self, address: &Address) -> Option<SharedConnection> {
        self.entries
            .lock()
            .get(address)
            .map(|e| e.connection.clone())
    }

    /// Remove every entry of `role` whose address is not in `keep`.
    ///
    /// The removed connections come back still open, owned by an [`Evicted`]
    /// batch that closes them.
    pub fn evict_missing(&self, role: NodeRole, keep: &BTreeSet<Address>) -> Evicted {
        let mut entries = self.entries.lock();
        let stale: Vec<Address> = entries
            .iter()
            .filter(|(address, entry)| entry.role == role && !keep.contains(*address))
            .map(|(address, _)| address.clone())
            .collect();

        Evicted::new(
            stale
                .into_iter()
                .filter_map(|address| {
                    entries
                        .remove(&address)
                        .map(|entry| (address, entry.connection))
                })
                .collect(),
        )
    }

    /// Remove every entry.
    pub fn drain(&self) -> Evicted {
        Evicted::new(
            std::mem::take(&mut *self.entries.lock())
                .into_iter()
                .map(|(address, entry)| (address, entry.connection))
                .collect(),
        )
    }

    /// Remove and close every entry.
    pub async fn close_all(&self) {
        self.drain().close().await;
    }
}

/// Connections taken out of the table that still have to be closed.
///
/// [`close`](Evicted::close) closes them one after another. Whatever is left
/// when the batch is dropped first, for example because the pass holding it
/// was cancelled, is closed on a background task.
#[must_use = "evicted connections are only closed by close() or on drop"]
pub struct Evicted {
    nodes: Vec<(Address, SharedConnection)>,
}

impl Evicted {
    /// Take ownership of connections that are no longer in any table.
    pub fn new(nodes: Vec<(Address, SharedConnection)>) -> Self {
        Self { nodes }
    }

    /// Addresses still waiting to be closed.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.nodes.iter().map(|(address, _)| address)
    }

    /// Number of connections still waiting to be closed.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is left to close.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Close every connection. Close errors are logged only.
    pub async fn close(mut self) {
        while !self.nodes.is_empty() {
            let (address, connection) = self.nodes.remove(0);
            close_node(&address, &connection).await;
        }
    }
}

impl Drop for Evicted {
    fn drop(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        let nodes = std::mem::take(&mut self.nodes);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (address, connection) in nodes {
                        close_node(&address, &connection).await;
                    }
                });
            }
            Err(_) => warn!(count = nodes.len(), "no runtime left to close connections"),
        }
    }
}

impl std::fmt::Debug for Evicted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.addresses()).finish()
    }
}

impl std::fmt::Debug for ConnectionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTable")
            .field("len", &self.len())
            .finish()
    }
}

/// Close connections removed from the table. Close errors are logged only.
pub async fn close_connections(nodes: Vec<(Address, SharedConnection)>) {
    Evicted::new(nodes).close().await;
}

async fn close_node(address: &Address, connection: &SharedConnection) {
    debug!(address = %address, "closing node connection");
    if let Err(e) = connection.close().await {
        warn!(address = %address, error = %e, "error closing connection");
    }
}
