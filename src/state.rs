use std::sync::Arc;

use crate::analysis::DomainAnalyzer;
use crate::events::EventSink;
use crate::rate_limit::TwoTierLimiter;
use crate::worker::BatchOrchestrator;

// app's shared state
pub struct AppState {
    pub analyzer: Arc<dyn DomainAnalyzer>,
    pub orchestrator: BatchOrchestrator,
    pub limiter: Arc<TwoTierLimiter>,
    pub events: Arc<dyn EventSink>,
    pub max_batch_size: usize, // domains accepted per batch request
}
