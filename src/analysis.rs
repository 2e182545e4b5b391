//! Single-domain analysis pipeline.
//!
//! `cache lookup -> (hit: done) | fetch -> parse -> count -> cache store -> done`.
//! Fetch and parse failures end the pipeline with a [`DomainError`]. A failed
//! cache write is reported and ignored.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::DomainCache;
use crate::error::DomainError;
use crate::events::{
    EventSink, OP_CACHE_HIT, OP_CACHE_MISS, OP_CACHE_SET, OP_DOMAIN_ANALYSIS, OP_FETCH_ADS_TXT,
    OP_PARSE_ADS_TXT, Severity,
};
use crate::fetcher::Fetcher;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::models::{AdvertiserCount, DomainAnalysis, sort_advertisers};
use crate::parser::AdsTxtParser;

#[async_trait]
pub trait DomainAnalyzer: Send + Sync {
    async fn analyze(&self, domain: &str) -> Result<DomainAnalysis, DomainError>;
}

pub struct AnalysisService {
    fetcher: Arc<dyn Fetcher>,
    parser: AdsTxtParser,
    cache: DomainCache,
    events: Arc<dyn EventSink>,
}

impl AnalysisService {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: DomainCache, events: Arc<dyn EventSink>) -> Self {
        Self {
            fetcher,
            parser: AdsTxtParser::new(),
            cache,
            events,
        }
    }

    async fn cached(&self, domain: &str) -> Option<DomainAnalysis> {
        match self.cache.get(domain).await {
            Ok(hit) => hit,
            Err(err) => {
                self.events.error(
                    OP_CACHE_HIT,
                    Some(domain),
                    "Cache read failed, treating as miss",
                    &err,
                    Severity::Low,
                );
                None
            }
        }
    }
}

#[async_trait]
impl DomainAnalyzer for AnalysisService {
    async fn analyze(&self, domain: &str) -> Result<DomainAnalysis, DomainError> {
        let start = Instant::now();

        if let Some(mut analysis) = self.cached(domain).await {
            CACHE_HITS.inc();
            self.events
                .success(OP_CACHE_HIT, Some(domain), "Retrieved analysis from cache");
            analysis.cached = true;
            return Ok(analysis);
        }
        CACHE_MISSES.inc();
        self.events
            .info(OP_CACHE_MISS, Some(domain), "Cache miss, fetching ads.txt");

        let content = match self.fetcher.fetch(domain).await {
            Ok(content) => content,
            Err(err) => {
                let err = DomainError::new(domain, err);
                self.events.error(
                    OP_FETCH_ADS_TXT,
                    Some(domain),
                    "Failed to fetch ads.txt",
                    &err,
                    Severity::Medium,
                );
                return Err(err);
            }
        };
        debug!(domain, bytes = content.len(), "fetched ads.txt");

        let entries = match self.parser.parse(&content) {
            Ok(entries) => entries,
            Err(err) => {
                let err = DomainError::new(domain, err);
                self.events.error(
                    OP_PARSE_ADS_TXT,
                    Some(domain),
                    "Failed to parse ads.txt",
                    &err,
                    Severity::Medium,
                );
                return Err(err);
            }
        };
        debug!(domain, entries = entries.len(), "parsed ads.txt");

        let analysis = build_analysis(domain, self.parser.count_advertisers(&entries));

        if let Err(err) = self.cache.set(domain, &analysis).await {
            self.events.error(
                OP_CACHE_SET,
                Some(domain),
                "Failed to cache analysis result",
                &err,
                Severity::Low,
            );
        }

        self.events.success(
            OP_DOMAIN_ANALYSIS,
            Some(domain),
            &format!(
                "Analyzed {} advertisers in {}ms",
                analysis.total_advertisers,
                start.elapsed().as_millis()
            ),
        );
        Ok(analysis)
    }
}

/// Turns per-exchange counts into a sorted analysis.
pub fn build_analysis(domain: &str, counts: HashMap<String, usize>) -> DomainAnalysis {
    let mut advertisers: Vec<AdvertiserCount> = counts
        .into_iter()
        .map(|(domain, count)| AdvertiserCount { domain, count })
        .collect();
    sort_advertisers(&mut advertisers);

    DomainAnalysis {
        domain: domain.to_string(),
        total_advertisers: advertisers.iter().map(|a| a.count).sum(),
        advertisers,
        cached: false,
        timestamp: Utc::now(),
    }
}
