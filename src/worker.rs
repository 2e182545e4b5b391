//! Batch fan-out and aggregation.
//!
//! Every domain gets its own task. A semaphore bounds how many pipelines run
//! at once, each task publishes exactly one [`DomainResult`] into a channel
//! sized to the batch, and a single consumer owns the summary and the
//! advertiser totals.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error};

use crate::analysis::DomainAnalyzer;
use crate::error::{DomainError, DomainErrorKind};
use crate::events::{EventSink, OP_BATCH_ANALYSIS, Severity};
use crate::metrics::{BATCH_DURATION, DOMAINS_IN_FLIGHT};
use crate::models::{
    AdvertiserCount, BatchAnalysisResponse, BatchSummary, DomainAnalysis, DomainResult,
    sort_advertisers,
};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub domain_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            domain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    analyzer: Arc<dyn DomainAnalyzer>,
    events: Arc<dyn EventSink>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        analyzer: Arc<dyn DomainAnalyzer>,
        events: Arc<dyn EventSink>,
        config: BatchConfig,
    ) -> Self {
        Self {
            analyzer,
            events,
            config,
        }
    }

    /// Analyzes every domain and merges the outcomes.
    ///
    /// Never fails: each domain yields one result, successful or not, and
    /// `results` follows the input order. Cancelling `cancel` makes the
    /// domains that have not finished yet fail.
    pub async fn analyze_domains(
        &self,
        domains: &[String],
        cancel: &CancellationToken,
    ) -> BatchAnalysisResponse {
        if domains.is_empty() {
            return BatchAnalysisResponse::empty();
        }

        let start = Instant::now();
        self.events.info(
            OP_BATCH_ANALYSIS,
            None,
            &format!("Starting batch analysis of {} domains", domains.len()),
        );

        // sized to the batch so publishing a result never waits
        let (tx, rx) = mpsc::channel::<(usize, DomainResult)>(domains.len());
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for (index, domain) in domains.iter().enumerate() {
            let task = DomainTask {
                analyzer: Arc::clone(&self.analyzer),
                events: Arc::clone(&self.events),
                gate: Arc::clone(&gate),
                cancel: cancel.clone(),
                timeout: self.config.domain_timeout,
                domain: domain.clone(),
            };
            let tx = tx.clone();

            tasks.spawn(
                async move {
                    let domain = task.domain.clone();
                    // a panicking event sink must not cost the domain its result
                    let result = match AssertUnwindSafe(task.run()).catch_unwind().await {
                        Ok(result) => result,
                        Err(_panic) => {
                            let err = DomainError::new(domain.as_str(), DomainErrorKind::Panicked);
                            DomainResult::failed(domain, &err)
                        }
                    };
                    // capacity equals the batch size, so this cannot block
                    let _ = tx.send((index, result)).await;
                }
                .instrument(Span::current()),
            );
        }
        // the channel closes once every task has dropped its sender
        drop(tx);

        let response = aggregate_results(rx, domains.len()).await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "batch task did not complete");
            }
        }

        let elapsed = start.elapsed();
        BATCH_DURATION.observe(elapsed.as_secs_f64());
        self.events.success(
            OP_BATCH_ANALYSIS,
            None,
            &format!(
                "Completed batch analysis: {} succeeded, {} failed, {} advertisers in {}ms",
                response.summary.succeeded,
                response.summary.failed,
                response.total_advertisers,
                elapsed.as_millis()
            ),
        );

        response
    }
}

struct DomainTask {
    analyzer: Arc<dyn DomainAnalyzer>,
    events: Arc<dyn EventSink>,
    gate: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    domain: String,
}

impl DomainTask {
    async fn run(self) -> DomainResult {
        let outcome = self.analyze().await;
        match outcome {
            Ok(analysis) => DomainResult::succeeded(self.domain, analysis),
            Err(err) => {
                let severity = match err.kind {
                    DomainErrorKind::Panicked => Severity::High,
                    _ => Severity::Medium,
                };
                self.events.error(
                    OP_BATCH_ANALYSIS,
                    Some(self.domain.as_str()),
                    "Failed to analyze domain in batch",
                    &err,
                    severity,
                );
                DomainResult::failed(self.domain.as_str(), &err)
            }
        }
    }

    async fn analyze(&self) -> Result<DomainAnalysis, DomainError> {
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(DomainError::new(&self.domain, DomainErrorKind::Canceled));
            }
            permit = Arc::clone(&self.gate).acquire_owned() => permit,
        };
        // the semaphore is never closed
        let Ok(_permit) = permit else {
            return Err(DomainError::new(&self.domain, DomainErrorKind::Canceled));
        };

        let _in_flight = InFlight::enter();
        let pipeline = AssertUnwindSafe(self.analyzer.analyze(&self.domain)).catch_unwind();
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(DomainError::new(&self.domain, DomainErrorKind::Canceled))
            }
            finished = tokio::time::timeout(self.timeout, pipeline) => match finished {
                Ok(Ok(result)) => result,
                Ok(Err(_panic)) => Err(DomainError::new(&self.domain, DomainErrorKind::Panicked)),
                Err(_elapsed) => Err(DomainError::new(
                    &self.domain,
                    DomainErrorKind::DeadlineExceeded(self.timeout),
                )),
            },
        };

        outcome
    }
}

// keeps DOMAINS_IN_FLIGHT balanced even when the task is aborted mid-analysis
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        DOMAINS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        DOMAINS_IN_FLIGHT.dec();
    }
}

/// Sole owner of the batch summary and advertiser totals.
async fn aggregate_results(
    mut rx: mpsc::Receiver<(usize, DomainResult)>,
    total: usize,
) -> BatchAnalysisResponse {
    let mut indexed = Vec::with_capacity(total);
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut summary = BatchSummary {
        total,
        ..BatchSummary::default()
    };

    while let Some((index, result)) = rx.recv().await {
        if result.success {
            summary.succeeded += 1;
            for advertiser in &result.advertisers {
                *counts.entry(advertiser.domain.clone()).or_insert(0) += advertiser.count;
            }
        } else {
            summary.failed += 1;
        }
        indexed.push((index, result));
    }

    indexed.sort_by_key(|(index, _)| *index);
    let results: Vec<DomainResult> = indexed.into_iter().map(|(_, result)| result).collect();

    let mut advertisers: Vec<AdvertiserCount> = counts
        .into_iter()
        .map(|(domain, count)| AdvertiserCount { domain, count })
        .collect();
    sort_advertisers(&mut advertisers);
    let total_advertisers = advertisers.iter().map(|a| a.count).sum();

    BatchAnalysisResponse {
        results,
        summary,
        advertisers,
        total_advertisers,
        timestamp: chrono::Utc::now(),
    }
}
