//! Exporter construction and initial topology build.

use std::sync::Arc;

use prometheus::Registry;
use tracing::{info, warn};

use super::source::{ConnectionSource, PooledSource, RequestScopedSource};
use super::Exporter;
use crate::config::Options;
use crate::connection::{Connector, MongoConnector};
use crate::error::{Error, Result};
use crate::metrics::{ExporterMetrics, ProcessGatherer, RegistryBuilder};
use crate::topology::table::close_connections;
use crate::topology::{
    shard_name_pattern, Address, ClusterTopology, ConnectionTable, DnsResolver, HostResolver,
    NodeRole, RouterDiscoverer, ShardMapResolver, TopologyLabelResolver,
};

/// Builds an [`Exporter`] from options.
///
/// In pooled mode the initial connections are opened by
/// [`build`](ExporterBuilder::build); any failure there is returned and
/// nothing is left open.
pub struct ExporterBuilder {
    options: Options,
    connector: Option<Arc<dyn Connector>>,
    resolver: Option<Arc<dyn HostResolver>>,
    registry: Option<Registry>,
}

impl ExporterBuilder {
    /// Start from validated or unvalidated options.
    pub fn new(options: Options) -> Self {
        Self {
            options,
            connector: None,
            resolver: None,
            registry: None,
        }
    }

    /// Use a custom connector instead of the driver.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom hostname resolver instead of the system one.
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register self metrics into `registry` instead of the default one.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate options, pick the connection strategy and connect.
    pub async fn build(self) -> Result<Exporter> {
        let options = self.options;
        options.validate()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(MongoConnector::new(options.mongodb.timeouts.clone())),
        };
        let registry = self
            .registry
            .unwrap_or_else(|| prometheus::default_registry().clone());
        let metrics = ExporterMetrics::new(&registry)?;
        let table = Arc::new(ConnectionTable::new());
        let mut topology = None;

        let source: Box<dyn ConnectionSource> = if !options.mongodb.global_conn_pool {
            if options.topology.broadcast_mode {
                warn!(
                    "broadcast mode needs the global connection pool, \
                     scraping the configured node only"
                );
            }
            Box::new(RequestScopedSource::new(
                options.mongodb.uri.clone(),
                options.mongodb.direct_connect,
                Arc::clone(&connector),
            ))
        } else if options.broadcast() {
            let resolver = self
                .resolver
                .unwrap_or_else(|| Arc::new(DnsResolver) as Arc<dyn HostResolver>);
            let cluster = Arc::new(build_cluster(&options, connector, resolver, &table)?);
            if let Err(e) = cluster.refresh().await {
                table.close_all().await;
                return Err(e);
            }
            info!(nodes = table.len(), "cluster topology built");
            topology = Some(cluster);
            Box::new(PooledSource::new(Arc::clone(&table)))
        } else {
            connect_single(&options, connector.as_ref(), &table).await?;
            Box::new(PooledSource::new(Arc::clone(&table)))
        };

        Ok(Exporter {
            source,
            builder: RegistryBuilder::new(options.collectors.clone()),
            process: ProcessGatherer::new(registry),
            metrics,
            table,
            topology,
            refresh_interval: options.topology.refresh_interval,
        })
    }
}

fn build_cluster(
    options: &Options,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn HostResolver>,
    table: &Arc<ConnectionTable>,
) -> Result<ClusterTopology> {
    let discoverer = RouterDiscoverer::new(
        &options.mongodb.uri,
        options.mongodb.direct_connect,
        resolver,
        Arc::clone(&connector),
        Arc::clone(table),
    )?;
    let shards = ShardMapResolver::new(
        &options.mongodb.uri,
        shard_name_pattern(&options.topology.shard_name_prefix)?,
        connector,
        Arc::clone(table),
    )?;
    Ok(ClusterTopology::new(discoverer, shards))
}

async fn connect_single(
    options: &Options,
    connector: &dyn Connector,
    table: &ConnectionTable,
) -> Result<()> {
    let address = Address::new(options.mongodb.uri.clone());
    let connection = connector
        .connect(address.as_str(), options.mongodb.direct_connect)
        .await
        .map_err(|e| Error::connect(address.to_string(), e))?;

    let labels = match TopologyLabelResolver::new().resolve(connection.as_ref()).await {
        Ok(labels) => labels,
        Err(e) => {
            close_connections(vec![(address, connection)]).await;
            return Err(e);
        }
    };

    if let Err(rejected) = table.try_insert(address.clone(), NodeRole::Direct, connection, labels) {
        close_connections(vec![(address, rejected)]).await;
    }
    Ok(())
}
