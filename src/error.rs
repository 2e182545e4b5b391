//! Error types.
//!
//! Admission denial is not an error (see [`crate::rate_limit`]); everything
//! that can go wrong while analysing one domain ends up in a [`DomainError`],
//! which a batch records per domain instead of propagating.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::models::ErrorResponse;

pub const RETRY_AFTER_HEADER: &str = "x-ratelimit-retry-after";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid domain format")]
    InvalidDomain,

    #[error("ads.txt not found for domain: HTTP {0}")]
    NotFound(u16),

    #[error("timeout while fetching ads.txt")]
    Timeout,

    #[error("unexpected HTTP status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("ads.txt file too large (exceeds {0} bytes)")]
    TooLarge(usize),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Request(err)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid ads.txt format: empty content")]
    Empty,

    #[error("invalid ads.txt format: no valid entries found")]
    NoEntries,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("TTL must be positive, got {0:?}")]
    InvalidTtl(Duration),

    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

/// Why the analysis of a single domain failed.
#[derive(Debug, Error)]
pub enum DomainErrorKind {
    #[error("failed to fetch ads.txt: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to parse ads.txt: {0}")]
    Parse(#[from] ParseError),

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("context canceled")]
    Canceled,

    #[error("analysis task panicked")]
    Panicked,
}

/// A failure scoped to one domain.
#[derive(Debug, Error)]
#[error("domain {domain}: {kind}")]
pub struct DomainError {
    pub domain: String,
    pub kind: DomainErrorKind,
}

impl DomainError {
    pub fn new(domain: impl Into<String>, kind: impl Into<DomainErrorKind>) -> Self {
        Self {
            domain: domain.into(),
            kind: kind.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            DomainErrorKind::Fetch(FetchError::NotFound(_)) => StatusCode::NOT_FOUND,
            DomainErrorKind::Fetch(FetchError::Timeout) | DomainErrorKind::DeadlineExceeded(_) => {
                StatusCode::REQUEST_TIMEOUT
            }
            DomainErrorKind::Fetch(FetchError::InvalidDomain) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{error}")]
    BadRequest { error: String, message: String },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("analysis failed: {0}")]
    Analysis(#[from] DomainError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest { error, message } => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(error, message))
            }
            ApiError::RateLimited => {
                let body = ErrorResponse::new("rate limit exceeded", "Please try again later");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER_HEADER, "1")],
                    Json(body),
                )
                    .into_response();
            }
            ApiError::Analysis(err) => (
                err.status_code(),
                ErrorResponse::new("analysis failed", err.to_string()),
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal server error", message),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_message_carries_domain_and_cause() {
        let err = DomainError::new("b.com", FetchError::NotFound(404));
        assert_eq!(
            err.to_string(),
            "domain b.com: failed to fetch ads.txt: ads.txt not found for domain: HTTP 404"
        );
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (DomainErrorKind::from(FetchError::NotFound(404)), StatusCode::NOT_FOUND),
            (DomainErrorKind::from(FetchError::Timeout), StatusCode::REQUEST_TIMEOUT),
            (
                DomainErrorKind::DeadlineExceeded(Duration::from_secs(30)),
                StatusCode::REQUEST_TIMEOUT,
            ),
            (DomainErrorKind::from(FetchError::InvalidDomain), StatusCode::BAD_REQUEST),
            (DomainErrorKind::from(ParseError::NoEntries), StatusCode::INTERNAL_SERVER_ERROR),
            (DomainErrorKind::Canceled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (kind, expected) in cases {
            assert_eq!(DomainError::new("x.com", kind).status_code(), expected);
        }
    }
}
