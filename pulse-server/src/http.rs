//! Pulse telemetry HTTP API.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! testable inner function, so the pipeline can be exercised without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - POST /api/telemetry — ingest one submission (rate limit → validate →
//!   sanitize → persist)
//! - GET  /api/health    — liveness probe
//! - GET  /api/stats     — rolling aggregate over recent records
//!
//! Error responses are deliberately generic: a 400 never reveals which
//! validation rule fired.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use pulse_core::limits::MAX_BODY_BYTES;
use pulse_core::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::ratelimit::RateLimiter;
use crate::sanitize::sanitize_batch;
use crate::storage::TelemetryStorage;
use crate::validate::validate_batch;

/// Shared state for all HTTP handlers.
pub struct HttpState {
    pub config: ServerConfig,
    pub limiter: RateLimiter,
    pub storage: TelemetryStorage,
}

impl HttpState {
    pub fn new(config: ServerConfig) -> Self {
        let storage = TelemetryStorage::new(config.storage_dir.clone());
        Self {
            config,
            limiter: RateLimiter::default(),
            storage,
        }
    }

    /// Assemble from pre-built parts; used by tests to shrink the limiter.
    pub fn with_parts(config: ServerConfig, limiter: RateLimiter, storage: TelemetryStorage) -> Self {
        Self {
            config,
            limiter,
            storage,
        }
    }
}

/// Build the axum router with all endpoints.
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/api/telemetry", post(telemetry_handler))
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Start the HTTP server on the configured address. Gracefully shuts down
/// when the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(HttpState::new(config));

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Pulse telemetry API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Handlers — thin wrappers over the inner functions
// ============================================================================

async fn telemetry_handler(
    State(state): State<Arc<HttpState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    // A body over the size ceiling fails extraction; keep the response as
    // generic as any other malformed submission.
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Could not read request body: {}", e);
            let (status, body) = invalid_format();
            return (status, Json(body));
        }
    };
    let ip = caller_identity(&headers, connect_info.map(|info| info.0));
    let (status, body) = telemetry_inner(&state, &ip, &body);
    (status, Json(body))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(health_inner(&state.config))
}

async fn stats_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = stats_inner(&state.storage);
    (status, Json(body))
}

/// Caller identity for rate limiting and the address hash: the first
/// `x-forwarded-for` hop when present, otherwise the socket peer.
fn caller_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// Inner (directly testable) pipeline functions
// ============================================================================

/// Full ingestion pipeline for one submission.
pub fn telemetry_inner(state: &HttpState, ip: &str, body: &[u8]) -> (StatusCode, serde_json::Value) {
    let now = Utc::now();

    if !state.limiter.check(ip, now) {
        tracing::debug!("Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({
                "success": false,
                "error": "Rate limit exceeded, please try again later",
            }),
        );
    }

    let parsed: serde_json::Value = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Submission is not valid JSON: {}", e);
            return invalid_format();
        }
    };

    if let Err(e) = validate_batch(body.len(), &parsed) {
        // Specific reason stays in the log; the response is generic.
        tracing::debug!("Submission rejected: {}", e);
        return invalid_format();
    }

    let event_count = parsed["events"].as_array().map(|e| e.len()).unwrap_or(0);
    let record = sanitize_batch(
        parsed,
        ip,
        &state.config.ip_salt,
        &state.config.service_version,
        now,
    );

    match state.storage.write_record(&record) {
        Ok(file_id) => (
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "eventsProcessed": event_count,
                "fileId": file_id,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to persist record: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "success": false,
                    "error": "Internal server error",
                }),
            )
        }
    }
}

fn invalid_format() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({
            "success": false,
            "error": "Invalid data format",
        }),
    )
}

pub fn health_inner(config: &ServerConfig) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "service": "pulse-telemetry",
        "version": config.service_version,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn stats_inner(storage: &TelemetryStorage) -> (StatusCode, serde_json::Value) {
    match storage.compute_stats() {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                tracing::error!("Failed to serialize stats: {}", e);
                internal_error()
            }
        },
        Err(e) => {
            tracing::error!("Failed to compute stats: {}", e);
            internal_error()
        }
    }
}

fn internal_error() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({
            "success": false,
            "error": "Internal server error",
        }),
    )
}

// ============================================================================
// Unit tests — inner functions and helpers
// ============================================================================
