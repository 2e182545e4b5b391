use axum::http::{HeaderName, Method, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::{get, post}};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::error;

use crate::error::ApiError;
use crate::handlers::{
    analyze_handler, batch_handler, health_handler, index_handler, metrics_handler,
};
use crate::middleware::{rate_limit, request_context};
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct ServerTimeouts {
    // receiving the request body
    pub read: Duration,
    // producing the whole response
    pub write: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(15),
            write: Duration::from_secs(15),
        }
    }
}

/// Builds the HTTP router.
///
/// Layers run outermost first: CORS, request context, rate limiting, the
/// read and write timeouts, panic recovery, then the handler. A request that
/// runs past the write timeout is answered with 408.
pub fn router(state: Arc<AppState>, timeouts: ServerTimeouts) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static(crate::middleware::REQUEST_ID_HEADER)]);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/analyze/{domain}", get(analyze_handler))
        .route("/api/batch-analysis", post(batch_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeouts.write,
        ))
        .layer(RequestBodyTimeoutLayer::new(timeouts.read))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(request_context))
        .layer(cors)
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "handler panicked");

    ApiError::Internal("An unexpected error occurred".to_string()).into_response()
}
