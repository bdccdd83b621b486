//! Router discovery.
//!
//! The router hostname is resolved on every pass and the resolved address
//! set is diffed against the router entries of the [`ConnectionTable`].
//! Membership follows DNS only; there is no health checking here.

use std::collections::BTreeSet;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};
use url::Url;

use super::table::close_connections;
use super::{
    parse_base_uri, router_address, uri_host, Address, ConnectionTable, LabelSet, NodeRole,
    CID_LABEL,
};
use crate::connection::Connector;
use crate::error::{Error, Result};

/// Resolves a hostname to its current addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Look up every address currently published for `host`.
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// System resolver backed by `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Addresses connected and inserted by this pass
    pub added: Vec<Address>,
    /// Addresses removed and closed by this pass
    pub evicted: Vec<Address>,
}

/// Keeps the router entries of the table in line with DNS.
pub struct RouterDiscoverer {
    base: Url,
    host: String,
    direct_connect: bool,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn Connector>,
    table: Arc<ConnectionTable>,
    pass: AsyncMutex<()>,
}

impl RouterDiscoverer {
    /// Create a discoverer for the router URI.
    pub fn new(
        router_uri: &str,
        direct_connect: bool,
        resolver: Arc<dyn HostResolver>,
        connector: Arc<dyn Connector>,
        table: Arc<ConnectionTable>,
    ) -> Result<Self> {
        let base = parse_base_uri(router_uri)?;
        let host = uri_host(&base)
            .ok_or_else(|| Error::invalid_uri(router_uri.to_string(), "missing host"))?;
        Ok(Self {
            base,
            host,
            direct_connect,
            resolver,
            connector,
            table,
            pass: AsyncMutex::new(()),
        })
    }

    /// The router hostname being resolved.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The table this discoverer writes to.
    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    /// Run one discovery pass.
    ///
    /// Resolution failures leave the table untouched. A connect failure ends
    /// the pass; routers added earlier in the same pass stay in the table.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let ips = self
            .resolver
            .lookup(&self.host)
            .await
            .map_err(|source| Error::Resolution {
                host: self.host.clone(),
                source,
            })?;
        if ips.is_empty() {
            return Err(Error::NoAddress(self.host.clone()));
        }

        let resolved = ips
            .into_iter()
            .map(|ip| router_address(&self.base, ip).map(|addr| (ip, addr)))
            .collect::<Result<Vec<_>>>()?;
        let keep: BTreeSet<Address> = resolved.iter().map(|(_, addr)| addr.clone()).collect();

        let _pass = self.pass.lock().await;
        let mut report = DiscoveryReport::default();

        let evicted = self.table.evict_missing(NodeRole::Router, &keep);
        for address in evicted.addresses() {
            debug!(address = %address, "router no longer resolved");
            report.evicted.push(address.clone());
        }
        evicted.close().await;

        for (ip, address) in resolved {
            if self.table.contains(&address) {
                continue;
            }
            info!(ip = %ip, "connecting to router");
            let connection = self
                .connector
                .connect(address.as_str(), self.direct_connect)
                .await
                .map_err(|e| Error::connect(address.to_string(), e))?;

            let labels = LabelSet::new().with(CID_LABEL, ip.to_string());
            match self
                .table
                .try_insert(address.clone(), NodeRole::Router, connection, labels)
            {
                Ok(()) => report.added.push(address),
                Err(rejected) => close_connections(vec![(address, rejected)]).await,
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for RouterDiscoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterDiscoverer")
            .field("host", &self.host)
            .field("direct_connect", &self.direct_connect)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_resolver_passes_ip_literals() {
        let ips = DnsResolver.lookup("10.1.2.3").await.unwrap();
        assert_eq!(ips, vec!["10.1.2.3".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_dns_resolver_localhost() {
        let ips = DnsResolver.lookup("localhost").await.unwrap();
        assert!(!ips.is_empty());
        assert!(ips.iter().all(|ip| ip.is_loopback()));
    }
}
