//! HTTP API for the relay service.
//!
//! - `POST /api/ask`: JSON question, plain-text answer
//! - `POST /api/upload`: multipart question and document, event-stream answer
//! - `GET /health` and `GET /metrics` for monitoring

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::service::RelayService;

pub mod ask;
use ask::{ask_handler, upload_handler};

/// Room for the multipart envelope on top of the document itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<RelayService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(
    service: Arc<RelayService>,
    metrics: Option<PrometheusHandle>,
) -> ServiceResult<Router> {
    let cors = cors_layer(&service.config.server)?;

    let max_upload = usize::try_from(service.config.limits.max_upload_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let api_routes = Router::new()
        .route("/ask", post(ask_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(max_upload)),
        );

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Only the configured origin may call the API (with credentials); without
/// one, any origin may, without credentials.
fn cors_layer(server: &ServerConfig) -> ServiceResult<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match server.cors_origin.as_deref() {
        Some(origin) => {
            let origin = HeaderValue::from_str(origin).map_err(|e| ServiceError::Config {
                message: format!("Invalid CORS origin {:?}: {}", origin, e),
            })?;
            Ok(cors.allow_origin(origin).allow_credentials(true))
        }
        None => Ok(cors.allow_origin(Any)),
    }
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let upstream_available = state.service.completion.health_check().await;

    Json(HealthResponse {
        status: if upstream_available {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        upstream_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    upstream_available: bool,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
