use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge,
    register_histogram, register_int_counter_vec,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("adstxt_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("adstxt_rate_limited_total", "Requests rejected by admission control").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("adstxt_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("adstxt_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("adstxt_cache_size", "Current number of items in cache").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "adstxt_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref BATCH_DURATION: Histogram = register_histogram!(
        "adstxt_batch_duration_seconds",
        "Batch analysis duration in seconds"
    )
    .unwrap();
    pub static ref DOMAINS_IN_FLIGHT: Gauge =
        register_gauge!("adstxt_domains_in_flight", "Domain analyses currently running").unwrap();
    pub static ref IDENTIFIER_BUCKETS: Gauge =
        register_gauge!("adstxt_identifier_buckets", "Tracked per-client rate limit buckets").unwrap();
    pub static ref EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "adstxt_events_total",
        "Observability events by operation and outcome",
        &["operation", "outcome"]
    )
    .unwrap();
}
