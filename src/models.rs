use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// one advertiser (exchange domain) and how many ads.txt lines name it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiserCount {
    pub domain: String,
    pub count: usize,
}

/// Sorts by count descending, then domain ascending.
pub fn sort_advertisers(advertisers: &mut [AdvertiserCount]) {
    advertisers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
}

// full analysis of one domain's ads.txt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub domain: String,
    pub total_advertisers: usize,
    pub advertisers: Vec<AdvertiserCount>,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalysisRequest {
    pub domains: Vec<String>,
}

// one entry of a batch response, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_advertisers: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advertisers: Vec<AdvertiserCount>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl DomainResult {
    pub fn succeeded(domain: impl Into<String>, analysis: DomainAnalysis) -> Self {
        Self {
            domain: domain.into(),
            total_advertisers: analysis.total_advertisers,
            advertisers: analysis.advertisers,
            cached: analysis.cached,
            error: None,
            success: true,
            timestamp: analysis.timestamp,
        }
    }

    pub fn failed(domain: impl Into<String>, err: &DomainError) -> Self {
        Self {
            domain: domain.into(),
            total_advertisers: 0,
            advertisers: Vec::new(),
            cached: false,
            error: Some(err.to_string()),
            success: false,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalysisResponse {
    pub results: Vec<DomainResult>,
    pub summary: BatchSummary,
    // summed across every succeeded domain
    pub advertisers: Vec<AdvertiserCount>,
    pub total_advertisers: usize,
    pub timestamp: DateTime<Utc>,
}

impl BatchAnalysisResponse {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            summary: BatchSummary::default(),
            advertisers: Vec::new(),
            total_advertisers: 0,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Direct,
    Reseller,
}

// a single valid ads.txt record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdsTxtEntry {
    pub exchange_domain: String,
    pub publisher_id: String,
    pub account_type: AccountType,
    pub certification_authority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
