//! HTTP read API for the excluded front end.
//!
//! A thin surface over the report store plus a manual trigger: the latest
//! report, the current frame bytes, a capture trigger, and a live
//! telemetry test. It never fabricates data for a failed cycle — a failed
//! trigger reports the stage and reason while the stale report keeps being
//! served.

use crate::pipeline::{Orchestrator, TriggerResult};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state of the serve surface.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Creates the serve state around an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Builds the API router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(get_health))
        .route("/image", get(get_image))
        .route("/api/image/base64", get(get_image_base64))
        .route("/api/capture", get(trigger_capture).post(trigger_capture))
        .route("/api/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the API until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: AppState, bind: &str) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await.map_err(|e| {
        crate::Error::OperationFailed {
            operation: "bind".to_string(),
            cause: e.to_string(),
        }
    })?;

    info!(bind, "serving read API");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| crate::Error::OperationFailed {
            operation: "serve".to_string(),
            cause: e.to_string(),
        })
}

/// `GET /api/health` — the latest report, or an explicit not-yet state.
async fn get_health(State(state): State<AppState>) -> Response {
    state.orchestrator.store().latest().map_or_else(
        || axum::Json(json!({"error": "no analysis data available yet"})).into_response(),
        |report| axum::Json(report).into_response(),
    )
}

/// `GET /image` — current frame bytes.
async fn get_image(State(state): State<AppState>) -> Response {
    state.orchestrator.store().current_frame_bytes().map_or_else(
        || (StatusCode::NOT_FOUND, "No image available").into_response(),
        |bytes| ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
    )
}

/// `GET /api/image/base64` — current frame as base64 JSON.
async fn get_image_base64(State(state): State<AppState>) -> Response {
    state.orchestrator.store().current_frame_bytes().map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                axum::Json(json!({"status": "error", "message": "No image available"})),
            )
                .into_response()
        },
        |bytes| {
            axum::Json(json!({"status": "success", "data": BASE64.encode(bytes)}))
                .into_response()
        },
    )
}

/// `GET|POST /api/capture` — run a cycle now.
///
/// Rejected with 409 while a cycle is in flight; a stage failure reports
/// its taxonomy reason without touching the previous report.
async fn trigger_capture(State(state): State<AppState>) -> Response {
    info!("manual capture triggered");
    let orchestrator = Arc::clone(&state.orchestrator);
    let result = tokio::task::spawn_blocking(move || orchestrator.try_run_cycle()).await;

    match result {
        Ok(TriggerResult::Completed(outcome)) => axum::Json(json!({
            "status": "success",
            "plants": outcome.plants,
            "fused": outcome.fused,
            "duration_ms": outcome.duration_ms,
        }))
        .into_response(),
        Ok(TriggerResult::Busy) => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "status": "busy",
                "message": "a capture cycle is already in flight",
            })),
        )
            .into_response(),
        Ok(TriggerResult::Failed(failure)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({
                "status": "error",
                "stage": failure.stage.as_str(),
                "message": failure.reason,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"status": "error", "message": e.to_string()})),
        )
            .into_response(),
    }
}

/// `GET /api/metrics` — live telemetry fetch test.
async fn get_metrics(State(state): State<AppState>) -> Response {
    let orchestrator = Arc::clone(&state.orchestrator);
    let summary = tokio::task::spawn_blocking(move || orchestrator.fetch_telemetry()).await;

    match summary {
        Ok(Some(summary)) => {
            axum::Json(json!({"status": "success", "data": summary})).into_response()
        }
        Ok(None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({
                "status": "error",
                "message": "Failed to fetch sensor data",
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"status": "error", "message": e.to_string()})),
        )
            .into_response(),
    }
}
