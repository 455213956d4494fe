// HTTP routes for health, metrics and realtime control

use crate::config_manager::ConfigManager;
use crate::metrics::Metrics;
use crate::session_manager::SessionManager;
use crate::websocket::websocket_handler;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use greensort_api::{
    ConfigUpdate, ConfigUpdateResponse, HealthResponse, ResetResponse, StatusResponse,
};
use greensort_core::{GreensortConfig, WasteClass};
use greensort_eye::InferenceAdapter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for every route
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigManager>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<Metrics>,
    pub adapter: Arc<dyn InferenceAdapter>,
}

impl AppState {
    pub fn new(config: GreensortConfig, adapter: Arc<dyn InferenceAdapter>) -> Self {
        let max_sessions = config.server.max_sessions;
        Self {
            config: Arc::new(ConfigManager::new(config)),
            sessions: Arc::new(SessionManager::new(max_sessions)),
            metrics: Arc::new(Metrics::new()),
            adapter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/realtime-detect", get(websocket_handler))
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/realtime/status", get(status))
        .route("/api/v1/realtime/config", post(update_config))
        .route("/api/v1/realtime/reset", post(reset_sessions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.prometheus_text(),
    )
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.config.get().await;
    Json(StatusResponse {
        adapter: state.adapter.name().to_string(),
        active_sessions: state.sessions.count(),
        max_sessions: state.sessions.max_sessions(),
        classes: WasteClass::ALL.to_vec(),
        default_threshold: config.stabilizer.default_threshold,
        threshold_per_class: config.stabilizer.threshold_per_class.clone(),
        streak_target: config.stabilizer.streak_target,
        miss_budget: config.stabilizer.miss_budget,
        grace_period_ms: config.stabilizer.grace_period_ms,
        totals: state.metrics.totals(),
    })
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigUpdateResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.config.apply_thresholds(&update).await {
        Ok(config) => Ok(Json(ConfigUpdateResponse {
            default_threshold: config.stabilizer.default_threshold,
            threshold_per_class: config.stabilizer.threshold_per_class,
        })),
        Err(e) => {
            warn!("Rejected threshold update: {}", e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e,
                    code: "INVALID_CONFIG".to_string(),
                }),
            ))
        }
    }
}

async fn reset_sessions(State(state): State<AppState>) -> Json<ResetResponse> {
    let sessions = state.sessions.reset_all();
    info!("Reset requested for {} sessions", sessions);
    Json(ResetResponse { sessions })
}
