//! HTTP API for health checks, Prometheus metrics and report history

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use pulse_lib::{
    health::{ComponentStatus, HealthRegistry},
    history::HistoryStore,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_HISTORY_HOURS: u64 = 24;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub store: HistoryStore,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, store: HistoryStore) -> Self {
        Self {
            health_registry,
            store,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    hours: Option<u64>,
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "History query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once a cycle completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut readiness = state.health_registry.readiness().await;
    if readiness.ready {
        if let Err(e) = state.store.ping().await {
            readiness.ready = false;
            readiness.reason = Some(format!("History store unreachable: {}", e));
        }
    }

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Records of the last `hours` hours, most recent first
async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let hours = query.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    let window = Duration::from_secs(hours.saturating_mul(3600));
    match state.store.load(window).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn latest(State(state): State<Arc<AppState>>) -> Response {
    match state.store.latest().await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no report recorded yet" })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/history", get(history))
        .route("/api/v1/history/latest", get(latest))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
