use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};

use crate::error::ApiError;

// prometheus scrape endpoint
pub async fn metrics_handler() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {e}")))?;

    let body = String::from_utf8(buffer)
        .map_err(|e| ApiError::Internal(format!("metrics are not valid UTF-8: {e}")))?;

    Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], body))
}
