//! HTTP handlers.

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};

use super::ServerState;
use crate::exporter::ScrapeError;

/// Scrape endpoint.
pub async fn metrics(State(state): State<ServerState>) -> Result<impl IntoResponse, ScrapeError> {
    let body = state.exporter.scrape().await?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

/// Landing page pointing at the scrape endpoint.
pub async fn landing(State(state): State<ServerState>) -> impl IntoResponse {
    Html(format!(
        "<html>\n\
         <head><title>MongoDB exporter</title></head>\n\
         <body>\n\
         <h1>MongoDB exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <p>version {version}</p>\n\
         </body>\n\
         </html>\n",
        path = state.telemetry_path,
        version = crate::version(),
    ))
}
