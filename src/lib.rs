//! # MongoDB Exporter - Topology-Aware Prometheus Metrics for MongoDB
//!
//! This crate scrapes MongoDB deployments and exposes their metrics in the
//! Prometheus text format. It works against standalone servers, replica sets
//! and sharded clusters, and in broadcast mode a single scrape covers every
//! router and every selected shard member of a cluster.
//!
//! ## Core Concepts
//!
//! - **Connections**: Long-lived or request-scoped sessions to one node
//! - **Topology**: Routers found through DNS, shard members read from the config server
//! - **Connection table**: Address keyed map of live connections and their labels
//! - **Collectors**: Units that query one node and emit gauges
//! - **Registries**: One isolated Prometheus registry per node and scrape
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       HTTP endpoint (axum)                          │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Exporter (connection source + gather)               │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                         │                         │
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │ Connection table│   │  Registry builder   │   │  Process registry   │
//! │ (routers +      │   │  (collectors per    │   │  (exporter's own    │
//! │  shard members) │   │   node role)        │   │   metrics)          │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          ▲
//!          │
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │        Refresh loop (router discovery + shard reconciliation)       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mongodb_exporter::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = Options::load(None)?;
//!     let exporter = Arc::new(ExporterBuilder::new(options.clone()).build().await?);
//!
//!     let shutdown = CancellationToken::new();
//!     exporter.spawn_refresh(shutdown.clone());
//!
//!     MetricsServer::new(options.web, exporter)
//!         .run_with_shutdown(async move { shutdown.cancelled().await })
//!         .await
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Connection types
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionError, Connector, MongoConnector,
        SharedConnection,
    };

    // Error handling
    pub use crate::error::{Error, Result};

    // Topology
    pub use crate::topology::{
        Address, ClusterTopology, ConnectionTable, LabelSet, NodeHandle, NodeRole, NodeType,
        RefreshLoop,
    };

    // Collectors and registries
    pub use crate::collectors::CollectorUnit;
    pub use crate::metrics::{Gatherer, Gatherers, NodeRegistry, RegistryBuilder};

    // Exporter and HTTP endpoint
    pub use crate::exporter::{Exporter, ExporterBuilder, ScrapeError};
    pub use crate::server::MetricsServer;

    // Configuration
    pub use crate::config::Options;

    pub use tokio_util::sync::CancellationToken;
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases for exporter operations.
pub mod error;

/// Connections to MongoDB nodes.
///
/// This module provides the [`Connection`](connection::Connection) and
/// [`Connector`](connection::Connector) traits and the driver backed
/// implementation. Everything above this layer talks to nodes only
/// through these traits.
pub mod connection;

// ============================================================================
// Cluster Topology
// ============================================================================

/// Cluster topology and the connection table.
///
/// Covers router discovery through hostname resolution, shard map
/// reconciliation, topology labels and the periodic refresh loop that keeps
/// the connection table in step with the cluster.
pub mod topology;

// ============================================================================
// Metrics
// ============================================================================

/// Collector units that query one node and emit gauges.
pub mod collectors;

/// Per-node registries, gathering and the exporter's own metrics.
pub mod metrics;

// ============================================================================
// Serving
// ============================================================================

/// Scrape assembly on top of a connection strategy.
pub mod exporter;

/// HTTP endpoint serving the text exposition.
pub mod server;

// ============================================================================
// Configuration
// ============================================================================

/// Layered configuration: defaults, file and environment.
pub mod config;

/// Tracing subscriber setup.
pub mod logging;

/// Returns the current version of the exporter.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns detailed version information including build metadata.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Detailed version information for the exporter build.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Semantic version string
    pub version: &'static str,
    /// Target architecture of the build
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mongodb_exporter {} ({}, {})",
            self.version, self.target, self.profile
        )
    }
}
