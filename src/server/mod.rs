//! HTTP endpoint serving the metrics exposition.
//!
//! # Example
//!
//! ```rust,ignore
//! use mongodb_exporter::server::MetricsServer;
//!
//! let server = MetricsServer::new(options.web.clone(), Arc::new(exporter));
//! server.run_with_shutdown(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;
use crate::error::{ErrorContext, Result};
use crate::exporter::Exporter;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct ServerState {
    /// The exporter answering scrapes
    pub exporter: Arc<Exporter>,
    /// Path the metrics are served on
    pub telemetry_path: String,
}

/// The metrics HTTP server.
pub struct MetricsServer {
    config: WebConfig,
    state: ServerState,
}

impl MetricsServer {
    /// Create a server for `exporter`.
    pub fn new(config: WebConfig, exporter: Arc<Exporter>) -> Self {
        let state = ServerState {
            exporter,
            telemetry_path: config.telemetry_path.clone(),
        };
        Self { config, state }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.telemetry_path, get(handlers::metrics))
            .route("/", get(handlers::landing))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.listen_address)
            .await
            .with_context(|| format!("cannot listen on {}", self.config.listen_address))?;

        info!(
            address = %self.config.listen_address,
            path = %self.config.telemetry_path,
            "serving metrics"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
