//! HTTP control surface, driven through the router without a socket.
#![cfg(feature = "http")]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use listing_harvest::extract::JsonExtractorSpec;
use listing_harvest::{
    Catalog, ExtractorSpec, FetchConfig, Fetcher, Harvester, Orchestrator, ReconciliationStore,
    SourceDescriptor, SourceKind,
};
use listing_harvest_cli::server::router;

async fn harvester(delay_ms: u64) -> (MockServer, Harvester) {
    harvester_with(delay_ms, &["registry"]).await
}

async fn harvester_with(delay_ms: u64, names: &[&str]) -> (MockServer, Harvester) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "name": "Acme", "location": "Tokyo", "industry": "IT" }]))
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(&server)
        .await;

    let sources = names
        .iter()
        .map(|name| {
            SourceDescriptor::new(
                *name,
                SourceKind::Api,
                format!("{}/{name}", server.uri()),
                ExtractorSpec::Json(JsonExtractorSpec::default()),
            )
        })
        .collect();
    let catalog = Catalog::new(sources).unwrap();
    let fetcher = Fetcher::new(FetchConfig {
        min_request_interval: Duration::ZERO,
        ..FetchConfig::default()
    })
    .unwrap();
    let orchestrator = Orchestrator::new(catalog, fetcher).unwrap();
    (server, Harvester::new(orchestrator, ReconciliationStore::in_memory()))
}

async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (_server, harvester) = harvester(0).await;
    let app = router(harvester);
    let (status, body) = call(&app, "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_list_sources() {
    let (_server, harvester) = harvester(0).await;
    let app = router(harvester);
    let (status, body) = call(&app, "GET", "/api/v1/sources", "").await;
    assert_eq!(status, StatusCode::OK);
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["name"], "registry");
}

#[tokio::test]
async fn test_status_when_idle() {
    let (_server, harvester) = harvester(0).await;
    let app = router(harvester);
    let (status, body) = call(&app, "GET", "/api/v1/fetch/status", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["isRunning"], false);
    assert_eq!(body["status"]["state"], "idle");
    assert_eq!(body["recentErrors"], json!([]));
}

#[tokio::test]
async fn test_start_then_conflict_then_stats() {
    let (_server, harvester) = harvester(300).await;
    let app = router(harvester.clone());

    let (status, body) = call(&app, "POST", "/api/v1/fetch/start", "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["started"], true);
    assert_eq!(body["status"]["isRunning"], true);

    let (status, body) = call(&app, "POST", "/api/v1/fetch/start", "{}").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["started"], false);

    harvester.wait().await;

    let (status, body) = call(&app, "GET", "/api/v1/fetch/status", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["state"], "completed");
    assert_eq!(body["status"]["completedSources"], 1);

    let (status, body) = call(&app, "GET", "/api/v1/listings/stats", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["by_industry"]["IT"], 1);
}

#[tokio::test]
async fn test_stop_running_fetch() {
    let (_server, harvester) = harvester_with(300, &["registry", "directory"]).await;
    let app = router(harvester.clone());

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/fetch/start",
        r#"{"sources": ["registry", "directory"], "timeoutSecs": 30}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = call(&app, "POST", "/api/v1/fetch/stop", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["isRunning"], false);

    harvester.wait().await;
    let status = harvester.status();
    assert_eq!(status.state.to_string(), "stopped");
    assert!(status.completed_sources < 2);
}

#[tokio::test]
async fn test_toggle_source_enabled() {
    let (server, harvester) = harvester_with(0, &["registry", "directory"]).await;
    let app = router(harvester.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/sources/registry/enabled",
        r#"{"enabled": false}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let registry = body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "registry")
        .unwrap();
    assert_eq!(registry["enabled"], false);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/sources/nowhere/enabled",
        r#"{"enabled": true}"#,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nowhere"));

    let (status, _) = call(&app, "POST", "/api/v1/fetch/start", "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    harvester.wait().await;

    // Disabled sources still count toward completion but fetch nothing.
    let status = harvester.status();
    assert_eq!(status.completed_sources, 2);
    assert_eq!(harvester.records().len(), 1);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/directory");
}

#[tokio::test]
async fn test_start_rejects_bad_json() {
    let (_server, harvester) = harvester(0).await;
    let app = router(harvester.clone());
    let (status, body) = call(&app, "POST", "/api/v1/fetch/start", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));
    assert!(!harvester.status().is_running);
}
