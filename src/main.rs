//! MongoDB exporter
//!
//! This is the main entry point for the exporter binary.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use cli::Cli;
use mongodb_exporter::config::Options;
use mongodb_exporter::connection::redact_uri;
use mongodb_exporter::exporter::ExporterBuilder;
use mongodb_exporter::logging::init_logging;
use mongodb_exporter::server::MetricsServer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration, flags win over file and environment
    let mut options = Options::load(cli.config.as_deref()).context("cannot load configuration")?;
    cli.apply(&mut options);

    init_logging(&options.logging).context("cannot initialize logging")?;
    info!(
        version = %mongodb_exporter::version_info(),
        uri = %redact_uri(&options.mongodb.uri),
        "starting exporter"
    );

    let exporter = match ExporterBuilder::new(options.clone()).build().await {
        Ok(exporter) => Arc::new(exporter),
        Err(e) => {
            error!(error = %e, "cannot start exporter");
            std::process::exit(e.exit_code());
        }
    };
    info!(source = exporter.source_name(), "exporter ready");

    let shutdown = CancellationToken::new();
    let refresh = exporter.spawn_refresh(shutdown.clone());

    let server = MetricsServer::new(options.web.clone(), Arc::clone(&exporter));
    let signal = shutdown.clone();
    let served = server
        .run_with_shutdown(async move {
            wait_for_signal().await;
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    if let Some(handle) = refresh {
        let _ = handle.await;
    }
    exporter.shutdown().await;
    info!("exporter stopped");

    if let Err(e) = served {
        error!(error = %e, "server error");
        std::process::exit(e.exit_code());
    }
    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
