//! ads.txt parsing.
//!
//! A record line is `exchange_domain, publisher_id, DIRECT|RESELLER[, cert_authority_id]`.
//! Comments, variable lines (`contact=...`) and malformed records are skipped.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ParseError;
use crate::models::{AccountType, AdsTxtEntry};

lazy_static! {
    static ref RECORD_LINE: Regex = Regex::new(
        r"(?i)^([^,\s]+),\s*([^,\s]+),\s*(DIRECT|RESELLER)(?:,\s*([^,\s]+))?\s*$"
    )
    .unwrap();
    static ref DOMAIN_NAME: Regex = Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdsTxtParser;

impl AdsTxtParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str) -> Result<Vec<AdsTxtEntry>, ParseError> {
        if content.is_empty() {
            return Err(ParseError::Empty);
        }

        let entries: Vec<AdsTxtEntry> = content
            .lines()
            .map(strip_comment)
            .filter(|line| !line.is_empty())
            .filter_map(parse_line)
            .collect();

        if entries.is_empty() {
            return Err(ParseError::NoEntries);
        }
        Ok(entries)
    }

    /// Number of records per exchange domain.
    pub fn count_advertisers(&self, entries: &[AdsTxtEntry]) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for entry in entries {
            *counts.entry(entry.exchange_domain.clone()).or_insert(0) += 1;
        }
        counts
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

fn parse_line(line: &str) -> Option<AdsTxtEntry> {
    let caps = RECORD_LINE.captures(line)?;

    let exchange_domain = caps[1].trim().to_lowercase();
    if !is_valid_domain(&exchange_domain) {
        return None;
    }

    let account_type = if caps[3].eq_ignore_ascii_case("DIRECT") {
        AccountType::Direct
    } else {
        AccountType::Reseller
    };

    Some(AdsTxtEntry {
        exchange_domain,
        publisher_id: caps[2].trim().to_string(),
        account_type,
        certification_authority: caps.get(4).map(|m| m.as_str().trim().to_string()),
    })
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    // trailing dot is valid in DNS
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if !domain.contains('.') || domain.len() <= 1 {
        return false;
    }

    DOMAIN_NAME.is_match(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# ads.txt for example.com
contact=ads@example.com

google.com, pub-1234567890, DIRECT, f08c47fec0942fa0
google.com, pub-0987654321, RESELLER, f08c47fec0942fa0
AppNexus.com, 1234, reseller
rubiconproject.com, 5678, DIRECT # inline note
not a record line
bad_domain, 1, DIRECT
openx.com, 999, PARTNER
";

    #[test]
    fn parses_valid_records_and_skips_the_rest() {
        let entries = AdsTxtParser::new().parse(SAMPLE).unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].exchange_domain, "google.com");
        assert_eq!(entries[0].publisher_id, "pub-1234567890");
        assert_eq!(entries[0].account_type, AccountType::Direct);
        assert_eq!(
            entries[0].certification_authority.as_deref(),
            Some("f08c47fec0942fa0")
        );

        assert_eq!(entries[2].exchange_domain, "appnexus.com");
        assert_eq!(entries[2].account_type, AccountType::Reseller);
        assert_eq!(entries[2].certification_authority, None);

        assert_eq!(entries[3].exchange_domain, "rubiconproject.com");
    }

    #[test]
    fn counts_records_per_exchange() {
        let parser = AdsTxtParser::new();
        let counts = parser.count_advertisers(&parser.parse(SAMPLE).unwrap());

        assert_eq!(counts.len(), 3);
        assert_eq!(counts["google.com"], 2);
        assert_eq!(counts["appnexus.com"], 1);
        assert_eq!(counts["rubiconproject.com"], 1);
    }

    #[test]
    fn empty_content_is_rejected() {
        assert_eq!(AdsTxtParser::new().parse(""), Err(ParseError::Empty));
    }

    #[test]
    fn content_without_records_is_rejected() {
        let content = "# only comments\ncontact=someone\n\n";
        assert_eq!(AdsTxtParser::new().parse(content), Err(ParseError::NoEntries));
    }

    #[test]
    fn domain_validation() {
        assert!(is_valid_domain("google.com"));
        assert!(is_valid_domain("ads.example.co.uk."));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("-bad.com"));
        assert!(!is_valid_domain("under_score.com"));
        assert!(!is_valid_domain(&format!("{}.com", "a".repeat(300))));
    }
}
