use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::events::OP_HEALTH_CHECK;
use crate::models::HealthResponse;
use crate::state::AppState;

// health handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.events.info(OP_HEALTH_CHECK, None, "Health check requested");

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// lists the available endpoints
pub async fn index_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "adstxt-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "analyze": "GET /api/analyze/{domain}",
            "batch": "POST /api/batch-analysis",
            "metrics": "GET /metrics"
        }
    }))
}
