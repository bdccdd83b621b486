//! Scrape failures as HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::exporter::ScrapeError;

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
