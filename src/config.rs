use clap::Parser;
use std::time::Duration;

use crate::rate_limit::LimiterConfig;
use crate::server::ServerTimeouts;
use crate::worker::BatchConfig;

pub const MAX_CONCURRENT_FETCHES_LIMIT: u64 = 1000;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "adstxt-gateway")]
#[command(about = "Rate-limited ads.txt analysis API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Cache TTL in seconds
    #[arg(long, env = "CACHE_TTL", default_value_t = 3600, value_parser = clap::value_parser!(u64).range(1..))]
    pub cache_ttl: u64,

    // How often expired cache entries are purged, in seconds
    #[arg(long, env = "CACHE_CLEANUP_INTERVAL", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub cache_cleanup_interval: u64,

    // Global admission rate (tokens per second)
    #[arg(long, env = "GLOBAL_RATE_LIMIT_PER_SEC", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub global_rate_limit: u64,

    // Global bucket capacity
    #[arg(long, env = "GLOBAL_BURST", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub global_burst: u64,

    // Per client IP admission rate (tokens per second)
    #[arg(long, env = "PER_IP_RATE_LIMIT_PER_SEC", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub per_ip_rate_limit: u64,

    // Per client IP bucket capacity
    #[arg(long, env = "PER_IP_BURST", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub per_ip_burst: u64,

    // Client IP buckets idle this long are evicted, in seconds
    #[arg(long, env = "BUCKET_IDLE_TIMEOUT", default_value_t = 1800, value_parser = clap::value_parser!(u64).range(1..))]
    pub bucket_idle_timeout: u64,

    // Eviction sweep interval in seconds
    #[arg(long, env = "BUCKET_SWEEP_INTERVAL", default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    pub bucket_sweep_interval: u64,

    // HTTP timeout for a single ads.txt download, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECONDS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout: u64,

    // Max domains analyzed at once within a batch
    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=MAX_CONCURRENT_FETCHES_LIMIT))]
    pub max_concurrent_fetches: u64,

    // Deadline for one domain inside a batch, in seconds
    #[arg(long, env = "DOMAIN_TIMEOUT_SECONDS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub domain_timeout: u64,

    // Max domains accepted in one batch request
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_batch_size: u64,

    // Time allowed to receive a request body, in seconds
    #[arg(long, env = "SERVER_READ_TIMEOUT", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout: u64,

    // Time allowed to produce a response, in seconds
    #[arg(long, env = "SERVER_WRITE_TIMEOUT", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub write_timeout: u64,

    // Grace period for in-flight requests on shutdown, in seconds
    #[arg(long, env = "SERVER_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,

    // Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // Emit JSON log lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            global_rate: self.global_rate_limit,
            global_burst: self.global_burst,
            identifier_rate: self.per_ip_rate_limit,
            identifier_burst: self.per_ip_burst,
            idle_threshold: Duration::from_secs(self.bucket_idle_timeout),
            sweep_interval: Duration::from_secs(self.bucket_sweep_interval),
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrent: self.max_concurrent_fetches as usize,
            domain_timeout: Duration::from_secs(self.domain_timeout),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn server_timeouts(&self) -> ServerTimeouts {
        ServerTimeouts {
            read: Duration::from_secs(self.read_timeout),
            write: Duration::from_secs(self.write_timeout),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}
