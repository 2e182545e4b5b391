use axum::{Json, extract::{Path, State}};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::DomainAnalysis;
use crate::state::AppState;

// analyzes a single domain, served from cache when possible
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<DomainAnalysis>, ApiError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(ApiError::bad_request(
            "domain is required",
            "Please provide a domain to analyze",
        ));
    }

    let analysis = state.analyzer.analyze(domain).await?;
    Ok(Json(analysis))
}
