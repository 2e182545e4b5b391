use adstxt_gateway::analysis::DomainAnalyzer;
use adstxt_gateway::error::{DomainError, FetchError};
use adstxt_gateway::events::TracingEvents;
use adstxt_gateway::models::{AdvertiserCount, DomainAnalysis};
use adstxt_gateway::rate_limit::{LimiterConfig, TwoTierLimiter};
use adstxt_gateway::server::{ServerTimeouts, router};
use adstxt_gateway::state::AppState;
use adstxt_gateway::worker::{BatchConfig, BatchOrchestrator};
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// "missing.*" domains have no ads.txt, "boom.*" domains panic, "slow.*"
// domains take a minute
struct StubAnalyzer;

#[async_trait]
impl DomainAnalyzer for StubAnalyzer {
    async fn analyze(&self, domain: &str) -> Result<DomainAnalysis, DomainError> {
        if domain.starts_with("missing.") {
            return Err(DomainError::new(domain, FetchError::NotFound(404)));
        }
        if domain.starts_with("boom.") {
            panic!("analyzer exploded");
        }
        if domain.starts_with("slow.") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        Ok(DomainAnalysis {
            domain: domain.to_string(),
            total_advertisers: 3,
            advertisers: vec![
                AdvertiserCount { domain: "google.com".to_string(), count: 2 },
                AdvertiserCount { domain: "appnexus.com".to_string(), count: 1 },
            ],
            cached: false,
            timestamp: Utc::now(),
        })
    }
}

fn app_with_limits(limiter: LimiterConfig, max_batch_size: usize) -> Router {
    app_with(limiter, max_batch_size, ServerTimeouts::default())
}

fn app_with(limiter: LimiterConfig, max_batch_size: usize, timeouts: ServerTimeouts) -> Router {
    let analyzer: Arc<dyn DomainAnalyzer> = Arc::new(StubAnalyzer);
    let events = Arc::new(TracingEvents);
    let orchestrator =
        BatchOrchestrator::new(Arc::clone(&analyzer), events.clone(), BatchConfig::default());

    router(
        Arc::new(AppState {
            analyzer,
            orchestrator,
            limiter: Arc::new(TwoTierLimiter::new(&limiter)),
            events,
            max_batch_size,
        }),
        timeouts,
    )
}

fn app() -> Router {
    app_with_limits(LimiterConfig::default(), 3)
}

fn batch_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/batch-analysis")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_version_and_request_id() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn analyze_returns_counts() {
    let response = app()
        .oneshot(Request::builder().uri("/api/analyze/example.com").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["domain"], "example.com");
    assert_eq!(body["total_advertisers"], 3);
    assert_eq!(body["advertisers"][0]["domain"], "google.com");
}

#[tokio::test]
async fn analyze_missing_ads_txt_is_404() {
    let response = app()
        .oneshot(Request::builder().uri("/api/analyze/missing.com").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "analysis failed");
    assert!(body["message"].as_str().unwrap().contains("missing.com"));
}

#[tokio::test]
async fn handler_panic_becomes_500() {
    let response = app()
        .oneshot(Request::builder().uri("/api/analyze/boom.com").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn batch_all_succeeded_is_200() {
    let response = app()
        .oneshot(batch_request(json!({ "domains": ["a.com", "b.com"] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["summary"], json!({ "total": 2, "succeeded": 2, "failed": 0 }));
    assert_eq!(body["total_advertisers"], 6);
    assert_eq!(body["advertisers"][0], json!({ "domain": "google.com", "count": 4 }));
}

#[tokio::test]
async fn batch_partial_success_is_207() {
    let response = app()
        .oneshot(batch_request(json!({ "domains": ["a.com", "missing.com", "boom.com"] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body = json_body(response).await;
    assert_eq!(body["summary"], json!({ "total": 3, "succeeded": 1, "failed": 2 }));

    let results = body["results"].as_array().unwrap();
    let domains: Vec<&str> = results.iter().map(|r| r["domain"].as_str().unwrap()).collect();
    assert_eq!(domains, vec!["a.com", "missing.com", "boom.com"]);
    assert_eq!(results[1]["success"], false);
    assert!(results[2]["error"].as_str().unwrap().contains("panicked"));
}

#[tokio::test]
async fn batch_all_failed_is_400() {
    let response = app()
        .oneshot(batch_request(json!({ "domains": ["missing.com"] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["summary"]["failed"], 1);
}

#[tokio::test]
async fn batch_rejects_empty_and_oversized_input() {
    let empty = app().oneshot(batch_request(json!({ "domains": [] }))).await.unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(empty).await["error"], "no domains provided");

    let oversized = app()
        .oneshot(batch_request(json!({ "domains": ["a.com", "b.com", "c.com", "d.com"] })))
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(oversized).await["error"], "too many domains");
}

#[tokio::test]
async fn batch_rejects_malformed_json() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/batch-analysis")
        .header("content-type", "application/json")
        .body(Body::from("{\"domains\": "))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid request body");
}

#[tokio::test]
async fn per_ip_burst_exhaustion_returns_429() {
    let limits = LimiterConfig {
        identifier_rate: 1,
        identifier_burst: 2,
        ..LimiterConfig::default()
    };
    let app = app_with_limits(limits, 3);

    let health = |ip: &'static str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(health("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = app.clone().oneshot(health("203.0.113.9")).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["x-ratelimit-retry-after"], "1");
    assert!(limited.headers().contains_key("x-request-id"));

    // another caller has its own bucket
    let other = app.oneshot(health("198.51.100.4")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn slow_response_hits_write_timeout() {
    let timeouts = ServerTimeouts {
        read: Duration::from_secs(15),
        write: Duration::from_secs(2),
    };
    let app = app_with(LimiterConfig::default(), 3, timeouts);

    let response = app
        .oneshot(Request::builder().uri("/api/analyze/slow.com").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key("x-request-id"));
}
