use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::{Json, extract::State};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::models::{BatchAnalysisRequest, BatchAnalysisResponse};
use crate::state::AppState;

/// Runs a batch analysis.
///
/// Answers 200 when every domain succeeded, 207 on partial success and 400
/// when nothing succeeded. In-flight domains are cancelled if the client
/// goes away and the handler future is dropped.
pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchAnalysisRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchAnalysisResponse>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request("invalid request body", rejection.body_text())
    })?;

    if request.domains.is_empty() {
        return Err(ApiError::bad_request(
            "no domains provided",
            "Please provide at least one domain to analyze",
        ));
    }
    if request.domains.len() > state.max_batch_size {
        return Err(ApiError::bad_request(
            "too many domains",
            format!("Maximum {} domains allowed per batch", state.max_batch_size),
        ));
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = state
        .orchestrator
        .analyze_domains(&request.domains, &cancel)
        .await;

    let status = match (response.summary.succeeded, response.summary.failed) {
        (0, _) => StatusCode::BAD_REQUEST,
        (_, 0) => StatusCode::OK,
        _ => StatusCode::MULTI_STATUS,
    };

    Ok((status, Json(response)))
}
