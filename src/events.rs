//! Fire-and-forget observability events.
//!
//! Components report what happened through an [`EventSink`] and never look
//! at the outcome. [`TracingEvents`] turns events into tracing records and a
//! per-operation prometheus counter.

use serde::Serialize;
use std::error::Error as StdError;
use tracing::{error, info, warn};

use crate::metrics::EVENTS_TOTAL;

pub const OP_DOMAIN_ANALYSIS: &str = "domain_analysis";
pub const OP_BATCH_ANALYSIS: &str = "batch_analysis";
pub const OP_CACHE_HIT: &str = "cache_hit";
pub const OP_CACHE_MISS: &str = "cache_miss";
pub const OP_CACHE_SET: &str = "cache_set";
pub const OP_RATE_LIMITED: &str = "rate_limited";
pub const OP_FETCH_ADS_TXT: &str = "fetch_ads_txt";
pub const OP_PARSE_ADS_TXT: &str = "parse_ads_txt";
pub const OP_SERVER_START: &str = "server_start";
pub const OP_SERVER_SHUTDOWN: &str = "server_shutdown";
pub const OP_HEALTH_CHECK: &str = "health_check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn info(&self, operation: &str, target: Option<&str>, message: &str);

    fn success(&self, operation: &str, target: Option<&str>, message: &str);

    fn error(
        &self,
        operation: &str,
        target: Option<&str>,
        message: &str,
        err: &(dyn StdError + 'static),
        severity: Severity,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn info(&self, operation: &str, target: Option<&str>, message: &str) {
        EVENTS_TOTAL.with_label_values(&[operation, "info"]).inc();
        info!(operation, target_name = target.unwrap_or_default(), "{message}");
    }

    fn success(&self, operation: &str, target: Option<&str>, message: &str) {
        EVENTS_TOTAL.with_label_values(&[operation, "success"]).inc();
        info!(operation, target_name = target.unwrap_or_default(), success = true, "{message}");
    }

    fn error(
        &self,
        operation: &str,
        target: Option<&str>,
        message: &str,
        err: &(dyn StdError + 'static),
        severity: Severity,
    ) {
        EVENTS_TOTAL.with_label_values(&[operation, "error"]).inc();
        let target_name = target.unwrap_or_default();
        match severity {
            Severity::High => error!(operation, target_name, severity = severity.as_str(), error = %err, "{message}"),
            Severity::Medium | Severity::Low => {
                warn!(operation, target_name, severity = severity.as_str(), error = %err, "{message}")
            }
        }
    }
}
