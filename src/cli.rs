//! Command-line interface for the exporter
//!
//! Every flag is optional. A flag that is given overrides the value loaded
//! from the configuration file and the environment.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use mongodb_exporter::config::{Options, ENV_CONFIG};
use mongodb_exporter::logging::LogFormat;

/// MongoDB exporter
///
/// Exposes metrics of a MongoDB server, replica set or sharded cluster in
/// the Prometheus text format.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mongodb_exporter")]
#[command(author = "MongoDB Exporter Contributors")]
#[command(version)]
#[command(about = "Prometheus exporter for MongoDB", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// MongoDB connection URI
    #[arg(long = "mongodb.uri", value_name = "URI")]
    pub uri: Option<String>,

    /// Address to listen on for the HTTP endpoint
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Keep connections open across scrapes
    #[arg(long = "mongodb.global-conn-pool")]
    pub global_conn_pool: bool,

    /// Connect directly to the configured node
    #[arg(long = "mongodb.direct-connect")]
    pub direct_connect: bool,

    /// Collections for collection statistics (db.collection, comma separated)
    #[arg(long = "mongodb.collstats-colls", value_delimiter = ',', value_name = "LIST")]
    pub collstats_colls: Vec<String>,

    /// Collections for index statistics (db.collection, comma separated)
    #[arg(long = "mongodb.indexstats-colls", value_delimiter = ',', value_name = "LIST")]
    pub indexstats_colls: Vec<String>,

    /// Expand bare database names into their collections
    #[arg(long = "discovering-mode")]
    pub discovering_mode: bool,

    /// Also expose metrics under their legacy names
    #[arg(long = "compatible-mode")]
    pub compatible_mode: bool,

    /// Scrape every router and shard member of the cluster
    #[arg(long = "broadcast-mode")]
    pub broadcast_mode: bool,

    /// Only connect to shards whose name starts with this pattern
    #[arg(long = "shard-name-prefix", value_name = "PATTERN")]
    pub shard_name_prefix: Option<String>,

    /// Interval between topology refresh passes (for example "30s")
    #[arg(long = "topology.refresh-interval", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub refresh_interval: Option<Duration>,

    /// Disable the diagnostic data collector
    #[arg(long = "disable.diagnosticdata")]
    pub disable_diagnostic_data: bool,

    /// Disable the replica set status collector
    #[arg(long = "disable.replicasetstatus")]
    pub disable_replicaset_status: bool,

    /// Disable serverStatus on routers
    #[arg(long = "disable.mongos-status")]
    pub disable_mongos_status: bool,

    /// Log level or filter directive
    #[arg(long = "log.level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long = "log.format", value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Overlay the given flags on `options`.
    pub fn apply(&self, options: &mut Options) {
        if let Some(uri) = &self.uri {
            options.mongodb.uri.clone_from(uri);
        }
        if let Some(address) = &self.listen_address {
            options.web.listen_address.clone_from(address);
        }
        if let Some(path) = &self.telemetry_path {
            options.web.telemetry_path.clone_from(path);
        }
        if let Some(prefix) = &self.shard_name_prefix {
            options.topology.shard_name_prefix.clone_from(prefix);
        }
        if let Some(interval) = self.refresh_interval {
            options.topology.refresh_interval = interval;
        }
        if let Some(level) = &self.log_level {
            options.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            options.logging.format = format;
        }

        if !self.collstats_colls.is_empty() {
            options.collectors.collstats_collections = self.collstats_colls.clone();
        }
        if !self.indexstats_colls.is_empty() {
            options.collectors.indexstats_collections = self.indexstats_colls.clone();
        }

        options.mongodb.global_conn_pool |= self.global_conn_pool;
        options.mongodb.direct_connect |= self.direct_connect;
        options.topology.broadcast_mode |= self.broadcast_mode;
        options.collectors.discovering_mode |= self.discovering_mode;
        options.collectors.compatible_mode |= self.compatible_mode;
        options.collectors.disable_diagnostic_data |= self.disable_diagnostic_data;
        options.collectors.disable_replicaset_status |= self.disable_replicaset_status;
        options.collectors.disable_mongos_status |= self.disable_mongos_status;
    }
}
