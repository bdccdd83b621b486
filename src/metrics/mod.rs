//! Metric registries and response assembly.
//!
//! - [`NodeRegistry`]: the collector units of one node, built by
//!   [`RegistryBuilder`] according to configuration and detected role
//! - [`Gatherers`]: an ordered list of registries merged into one response,
//!   continuing past per-registry errors
//! - [`ExporterMetrics`]: the exporter's own instrumentation
//!
//! # Example
//!
//! ```rust,ignore
//! use mongodb_exporter::metrics::{encode_text, Gatherers, ProcessGatherer, RegistryBuilder};
//!
//! let mut gatherers = Gatherers::new();
//! gatherers.push(Box::new(ProcessGatherer::new(prometheus::default_registry().clone())));
//! gatherers.push(Box::new(builder.build(conn, labels).await?));
//! let outcome = gatherers.gather().await;
//! let body = encode_text(&outcome.families)?;
//! ```

mod builder;
mod gather;
mod instrumentation;
mod registry;

pub use builder::RegistryBuilder;
pub use gather::{encode_text, merge_families, GatherOutcome, Gatherer, Gatherers, ProcessGatherer};
pub use instrumentation::{
    ExporterMetrics, CAUSE_CONNECT, CAUSE_ENCODING, CAUSE_GATHERING, CAUSE_TOPOLOGY,
};
pub use registry::NodeRegistry;
