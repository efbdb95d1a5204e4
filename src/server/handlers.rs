//! HTTP request handlers
//!
//! Contains handlers for all HTTP endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;
use tracing::{debug, instrument};

use super::AppState;
use crate::transformer::PrometheusFormatter;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Health status
    status: String,
    /// Application version
    version: String,
}

/// Root endpoint - displays basic info
pub async fn root(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>rSolr-Exporter</title>
</head>
<body>
    <h1>rSolr-Exporter</h1>
    <p>Version: {}</p>
    <p>Solr: {} ({})</p>
    <ul>
        <li><a href="/health">Health Check</a></li>
        <li><a href="{}">Metrics</a></li>
    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION"),
        state.config.solr.base_url,
        state.config.solr.mode,
        state.config.server.path
    );
    Html(html)
}

/// Health check endpoint
///
/// Reports the exporter itself; Solr availability shows up in the metrics.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint - runs one scrape cycle and returns Prometheus format
#[instrument(skip(state), name = "metrics_handler")]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let families = state.collector.collect().await;
    let output = PrometheusFormatter::new().format(&families);

    debug!(
        families = families.len(),
        bytes = output.len(),
        "Metrics rendered"
    );

    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(path: &str) -> AppState {
        let mut config = Config::default();
        config.solr.base_url = "http://127.0.0.1:9/solr".to_string();
        config.solr.timeout_ms = 200;
        config.scrape.max_retries = 0;
        config.server.path = path.to_string();
        AppState::new(config).unwrap()
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = get(router(state("/metrics")), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"healthy\""));
        assert!(body.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_root_links_metrics_path() {
        let (status, _, body) = get(router(state("/solr-metrics")), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("rSolr-Exporter"));
        assert!(body.contains("href=\"/solr-metrics\""));
    }

    #[tokio::test]
    async fn test_metrics_with_unreachable_solr() {
        let (status, content_type, body) = get(router(state("/metrics")), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(CONTENT_TYPE));
        assert!(body.contains("# TYPE solr_scrape_duration_seconds gauge\n"));
        assert_eq!(body.matches("\nsolr_scrape_duration_seconds ").count(), 1);
        assert!(!body.contains("solr_ping"));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let app = router(state("/solr-metrics"));
        let (status, _, _) = get(app.clone(), "/solr-metrics").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = get(app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
