//! Query classification for lookup dispatch

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ClassifiedQuery, QueryKind};

/// Dotted quad with an optional 1-2 digit CIDR suffix
fn ip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{1,3}(\.\d{1,3}){3}(/\d{1,2})?$").expect("Failed to compile IP pattern")
    })
}

/// Classify a raw query and derive its enrichment form.
///
/// Octet ranges are not checked, so "300.1.1.1" still classifies as an IP;
/// out-of-range addresses are left to the enrichment providers to reject.
/// `normalized` strips the CIDR suffix, the raw value is kept for the
/// primary search.
pub fn classify(raw: &str) -> ClassifiedQuery {
    if ip_pattern().is_match(raw) {
        let normalized = raw.split('/').next().unwrap_or(raw).to_string();
        ClassifiedQuery {
            raw: raw.to_string(),
            kind: QueryKind::Ip,
            normalized,
        }
    } else {
        ClassifiedQuery {
            raw: raw.to_string(),
            kind: QueryKind::Other,
            normalized: raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> QueryKind {
        classify(raw).kind
    }

    #[test]
    fn dotted_quads_classify_as_ip() {
        assert_eq!(kind("8.8.8.8"), QueryKind::Ip);
        assert_eq!(kind("192.168.0.1"), QueryKind::Ip);
        assert_eq!(kind("1.2.3.4"), QueryKind::Ip);
    }

    #[test]
    fn octet_ranges_are_not_validated() {
        assert_eq!(kind("300.1.1.1"), QueryKind::Ip);
        assert_eq!(kind("999.999.999.999"), QueryKind::Ip);
    }

    #[test]
    fn cidr_suffix_is_accepted_and_stripped() {
        let q = classify("10.0.0.0/8");
        assert_eq!(q.kind, QueryKind::Ip);
        assert_eq!(q.raw, "10.0.0.0/8");
        assert_eq!(q.normalized, "10.0.0.0");

        let q = classify("1.2.3.4/24");
        assert_eq!(q.normalized, "1.2.3.4");
    }

    #[test]
    fn three_digit_cidr_suffix_is_rejected() {
        assert_eq!(kind("1.2.3.4/245"), QueryKind::Other);
    }

    #[test]
    fn non_ip_queries_classify_as_other() {
        assert_eq!(kind("example.com"), QueryKind::Other);
        assert_eq!(kind("user@example.com"), QueryKind::Other);
        assert_eq!(kind("1.2.3"), QueryKind::Other);
        assert_eq!(kind("1.2.3.4.5"), QueryKind::Other);
        assert_eq!(kind(""), QueryKind::Other);
        assert_eq!(kind(" 8.8.8.8"), QueryKind::Other);
    }

    #[test]
    fn non_ip_normalized_is_the_raw_query() {
        let q = classify("example.com");
        assert_eq!(q.normalized, "example.com");
    }
}
