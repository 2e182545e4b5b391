//! ads.txt analysis service.
//!
//! Downloads a publisher's `/ads.txt`, counts the advertising systems it
//! authorizes and serves the result over HTTP, for one domain or for a batch
//! fanned out under a concurrency bound. Callers are admitted through a
//! two-tier token bucket limiter.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod parser;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod worker;
