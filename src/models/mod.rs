//! Core data models for threat indicator lookups

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a raw query is classified before dispatch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Ip,
    Other,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Ip => write!(f, "ip"),
            QueryKind::Other => write!(f, "other"),
        }
    }
}

/// A classified query: the raw input plus its enrichment form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedQuery {
    /// Original input, used verbatim for the primary search
    pub raw: String,
    pub kind: QueryKind,
    /// Raw input with any CIDR suffix stripped, used for enrichment
    pub normalized: String,
}

/// The indicator shown for a search, found or synthesized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndicatorRecord {
    pub value: String,
    pub category: String,
    pub source: String,
    pub severity: String,
    pub notes: String,
}

impl IndicatorRecord {
    /// Placeholder shown when the database has no match for a query
    pub fn fallback(query: &str) -> Self {
        Self {
            value: query.to_string(),
            category: "N/A".to_string(),
            source: "Fallback".to_string(),
            severity: "Unknown".to_string(),
            notes: "Not found in DB".to_string(),
        }
    }
}

/// Stored indicator row, as served by the API
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Indicator {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub indicator_type: String,
    pub value: String,
    pub category: String,
    pub source: String,
    pub first_seen: String,
    pub last_seen: String,
    pub severity: String,
    pub notes: String,
}

/// New indicator from a feed collector or manual import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIndicator {
    #[serde(rename = "type")]
    pub indicator_type: String,
    pub value: String,
    pub category: String,
    pub source: String,
    pub severity: String,
    pub notes: String,
}

/// GeoIP lookup result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoInfo {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub isp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// Blocklist verdict for an IP, cached or live
///
/// Provider fields beyond the ones named here are kept in `extra` so a
/// write-back stores the payload verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlocklistRecord {
    #[serde(default)]
    pub blocklist: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// GeoIP and blocklist data for one IP query; either side may be absent
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IpEnrichment {
    pub geo: Option<GeoInfo>,
    pub blocklist: Option<BlocklistRecord>,
}

/// Everything a completed search produces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupResult {
    pub indicator: IndicatorRecord,
    pub geo: Option<GeoInfo>,
    pub blocklist: Option<BlocklistRecord>,
}

/// Dashboard counters, each defaulting to zero/empty when its read fails
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DashboardStats {
    pub entries: i64,
    pub searches: i64,
    pub categories: std::collections::HashMap<String, i64>,
}

/// Raw CVE feed item; upstream feeds disagree on field names
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveItem {
    pub title: Option<String>,
    pub name: Option<String>,
    pub cve_id: Option<String>,
    pub link: Option<String>,
    pub url: Option<String>,
}

impl CveItem {
    /// Collapse the aliased fields into a displayable headline
    pub fn headline(self) -> CveHeadline {
        let title = [self.title, self.name, self.cve_id]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Unknown CVE".to_string());
        let link = [self.link, self.url]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "#".to_string());
        CveHeadline { title, link }
    }
}

/// Normalized CVE headline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CveHeadline {
    pub title: String,
    pub link: String,
}

/// Query parameters for exact-match checks
#[derive(Debug, Clone, Deserialize)]
pub struct CheckParams {
    #[serde(rename = "type")]
    pub indicator_type: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_record_has_placeholder_fields() {
        let record = IndicatorRecord::fallback("198.51.100.7");
        assert_eq!(record.value, "198.51.100.7");
        assert_eq!(record.category, "N/A");
        assert_eq!(record.source, "Fallback");
        assert_eq!(record.severity, "Unknown");
        assert_eq!(record.notes, "Not found in DB");
    }

    #[test]
    fn headline_prefers_title_then_aliases() {
        let item = CveItem {
            title: Some("CVE-2024-0001: buffer overflow".to_string()),
            name: Some("ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(item.headline().title, "CVE-2024-0001: buffer overflow");

        let item = CveItem {
            title: Some("".to_string()),
            cve_id: Some("CVE-2024-0002".to_string()),
            url: Some("https://example.org/cve".to_string()),
            ..Default::default()
        };
        let headline = item.headline();
        assert_eq!(headline.title, "CVE-2024-0002");
        assert_eq!(headline.link, "https://example.org/cve");
    }

    #[test]
    fn headline_defaults_when_everything_is_missing() {
        let headline = CveItem::default().headline();
        assert_eq!(headline.title, "Unknown CVE");
        assert_eq!(headline.link, "#");
    }

    #[test]
    fn blocklist_record_round_trips_unknown_fields() {
        let payload = serde_json::json!({
            "blocklist": true,
            "reason": "spam",
            "sensor-count": 12,
            "is-proxy": false,
        });
        let record: BlocklistRecord = serde_json::from_value(payload.clone()).unwrap();
        assert!(record.blocklist);
        assert_eq!(record.reason.as_deref(), Some("spam"));
        assert_eq!(serde_json::to_value(&record).unwrap(), payload);
    }
}
