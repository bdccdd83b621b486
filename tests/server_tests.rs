//! HTTP endpoint tests.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use prometheus::Registry;
use tower::ServiceExt;

use mongodb_exporter::config::{Options, WebConfig};
use mongodb_exporter::connection::Connector;
use mongodb_exporter::exporter::ExporterBuilder;
use mongodb_exporter::server::MetricsServer;

const URI: &str = "mongodb://db.svc:27017";

async fn server(connector: Arc<MockConnector>) -> MetricsServer {
    let mut options = Options::default();
    options.mongodb.uri = URI.to_string();
    let exporter = ExporterBuilder::new(options)
        .with_connector(connector as Arc<dyn Connector>)
        .with_registry(Registry::new())
        .build()
        .await
        .unwrap();
    MetricsServer::new(WebConfig::default(), Arc::new(exporter))
}

async fn get(server: &MetricsServer, path: &str) -> (StatusCode, Option<String>, String) {
    let response = server
        .router()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text_format() {
    let server = server(standalone_connector()).await;

    let (status, content_type, body) = get(&server, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(prometheus::TEXT_FORMAT));
    assert!(body.contains("# TYPE mongodb_up gauge"));
    assert!(body.contains("mongodb_up 1"));
    assert!(body.contains("mongodb_exporter_scrape_duration_seconds"));
}

#[tokio::test]
async fn test_connect_failure_returns_500() {
    let connector = standalone_connector();
    connector.refuse(URI);
    let server = server(connector).await;

    let (status, content_type, body) = get(&server, "/metrics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert!(body.starts_with("An error has occurred while connecting to MongoDB:\n\n"));
}

#[tokio::test]
async fn test_topology_failure_returns_500() {
    let connector = Arc::new(MockConnector::new(|conn| conn.fail("isMaster")));
    let server = server(Arc::clone(&connector)).await;

    let (status, _, body) = get(&server, "/metrics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("An error has occurred while getting topology info:"));
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn test_landing_page_links_metrics() {
    let server = server(standalone_connector()).await;

    let (status, _, body) = get(&server, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("href=\"/metrics\""));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = server(standalone_connector()).await;
    let (status, _, _) = get(&server, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
