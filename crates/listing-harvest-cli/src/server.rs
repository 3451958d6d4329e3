//! HTTP control surface: start/stop/inspect background runs.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use listing_harvest::{BackgroundRequest, HarvestError, Harvester, SourceSelection};

/// Body of `POST /api/v1/fetch/start`. Every field is optional and an
/// empty body starts a run over all sources.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl From<StartRequest> for BackgroundRequest {
    fn from(req: StartRequest) -> Self {
        Self {
            selection: if req.sources.is_empty() {
                SourceSelection::All
            } else {
                SourceSelection::Named(req.sources)
            },
            timeout: req.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Body of `POST /api/v1/sources/:name/enabled`.
#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Build the axum Router with all endpoints.
pub fn router(harvester: Harvester) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/sources", get(list_sources))
        .route("/api/v1/sources/:name/enabled", post(set_source_enabled))
        .route("/api/v1/fetch/start", post(start_fetch))
        .route("/api/v1/fetch/stop", post(stop_fetch))
        .route("/api/v1/fetch/status", get(fetch_status))
        .route("/api/v1/listings/stats", get(listing_stats))
        .layer(cors)
        .with_state(harvester)
}

/// Serve until the process is interrupted.
pub async fn serve(addr: &str, harvester: Harvester) -> anyhow::Result<()> {
    let app = router(harvester.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP control surface listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, stopping any background run");
            harvester.stop();
        })
        .await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_sources(State(harvester): State<Harvester>) -> Json<Value> {
    Json(json!({ "sources": harvester.orchestrator().list_sources() }))
}

async fn set_source_enabled(
    State(harvester): State<Harvester>,
    Path(name): Path<String>,
    Json(req): Json<EnabledRequest>,
) -> Response {
    match harvester.orchestrator().set_source_enabled(&name, req.enabled) {
        Ok(()) => {
            tracing::info!("source '{name}' enabled={}", req.enabled);
            Json(json!({ "sources": harvester.orchestrator().list_sources() })).into_response()
        }
        Err(e @ HarvestError::InvalidInput(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn start_fetch(State(harvester): State<Harvester>, body: Bytes) -> Response {
    let request: StartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("invalid request body: {e}") })),
                )
                    .into_response()
            }
        }
    };

    let started = harvester.start(request.into());
    let status = if started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (
        status,
        Json(json!({ "started": started, "status": harvester.status() })),
    )
        .into_response()
}

async fn stop_fetch(State(harvester): State<Harvester>) -> Json<Value> {
    harvester.stop();
    Json(json!({ "status": harvester.status() }))
}

async fn fetch_status(State(harvester): State<Harvester>) -> Json<Value> {
    let status = harvester.status();
    Json(json!({
        "status": status,
        "recentErrors": harvester.orchestrator().status_board().recent_errors(5),
    }))
}

async fn listing_stats(State(harvester): State<Harvester>) -> Json<Value> {
    Json(json!(harvester.stats()))
}
