//! Request-scoped middleware: request ids, access logging and admission
//! control.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::{OP_RATE_LIMITED, Severity};
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// stored in request extensions by `request_context`
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: String,
}

/// Resolves the caller's address.
///
/// The first `X-Forwarded-For` entry wins, then `X-Real-IP`, then the socket
/// peer address. Falls back to `"unknown"` so every caller still gets a
/// bucket.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').map(str::trim).find(|ip| !ip.is_empty()));
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Tags the request with an id, logs it and records request metrics.
pub async fn request_context(mut req: Request, next: Next) -> Response {
    let context = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        client_ip: client_ip(req.headers(), peer_addr(&req)),
    };
    let span = info_span!(
        "http_request",
        request_id = %context.request_id,
        client_ip = %context.client_ip,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let request_id = context.request_id.clone();
    req.extensions_mut().insert(context);

    REQUEST_TOTAL.inc();
    let start = Instant::now();

    let mut response = async move {
        info!("HTTP request received");
        next.run(req).await
    }
    .instrument(span.clone())
    .await;

    let elapsed = start.elapsed();
    REQUEST_LATENCY.observe(elapsed.as_secs_f64());
    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "HTTP request processed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Admits or rejects the request through the two-tier limiter, keyed by
/// client IP.
pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let ip = match req.extensions().get::<RequestContext>() {
        Some(context) => context.client_ip.clone(),
        None => client_ip(req.headers(), peer_addr(&req)),
    };

    if !state.limiter.allow(&ip) {
        RATE_LIMITED_TOTAL.inc();
        state.events.error(
            OP_RATE_LIMITED,
            Some(ip.as_str()),
            "Rate limit exceeded",
            &ApiError::RateLimited,
            Severity::Medium,
        );
        return ApiError::RateLimited.into_response();
    }

    next.run(req).await
}
