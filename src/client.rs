//! HTTP client for the dashboard API
//!
//! One method per endpoint the lookup workflow consumes. Apart from the
//! primary search, every call degrades to a neutral default on failure so a
//! partial outage never blanks the whole dashboard.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{BlocklistRecord, CveHeadline, CveItem, DashboardStats, IndicatorRecord};

/// The one failure a lookup surfaces to users: the primary search could not
/// produce a record. Transport errors and bad statuses collapse into it.
#[derive(Debug, Error)]
#[error("Error fetching threat data")]
pub struct SearchError {
    #[source]
    source: Option<reqwest::Error>,
    status: Option<StatusCode>,
}

impl SearchError {
    fn transport(source: reqwest::Error) -> Self {
        Self {
            source: Some(source),
            status: None,
        }
    }

    fn status(status: StatusCode) -> Self {
        Self {
            source: None,
            status: Some(status),
        }
    }

    /// Response status, when the request got that far
    pub fn response_status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// Search response body: the endpoint returns an array of matches, older
/// deployments return a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Many(Vec<PartialIndicator>),
    One(PartialIndicator),
}

impl SearchResponse {
    fn into_record(self, query: &str) -> IndicatorRecord {
        let first = match self {
            SearchResponse::Many(items) => items.into_iter().next(),
            SearchResponse::One(item) => Some(item),
        };
        first
            .and_then(PartialIndicator::complete)
            .unwrap_or_else(|| IndicatorRecord::fallback(query))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialIndicator {
    value: Option<String>,
    category: Option<String>,
    source: Option<String>,
    severity: Option<String>,
    notes: Option<String>,
}

impl PartialIndicator {
    /// A record missing any display field is treated as no match
    fn complete(self) -> Option<IndicatorRecord> {
        Some(IndicatorRecord {
            value: self.value?,
            category: self.category?,
            source: self.source?,
            severity: self.severity?,
            notes: self.notes?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
struct CveFeedResponse {
    #[serde(default)]
    items: Vec<CveItem>,
}

/// Client for the dashboard API
#[derive(Clone)]
pub struct DashboardClient {
    client: Client,
    base_url: String,
}

impl DashboardClient {
    /// Create a client for the API at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Search the indicator database for a raw query.
    ///
    /// An unreachable server or a non-success status aborts the search. A
    /// reachable server that returns nothing usable yields the fallback
    /// record instead.
    pub async fn search(&self, query: &str) -> Result<IndicatorRecord, SearchError> {
        let response = self
            .client
            .get(format!("{}/api/fts_search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(SearchError::transport)?;

        if !response.status().is_success() {
            return Err(SearchError::status(response.status()));
        }

        match response.json::<SearchResponse>().await {
            Ok(body) => Ok(body.into_record(query)),
            Err(e) => {
                tracing::debug!(error = %e, query, "Undecodable search response, using fallback");
                Ok(IndicatorRecord::fallback(query))
            }
        }
    }

    /// Cached blocklist record for an IP, `None` on any kind of miss.
    ///
    /// The cache endpoint answers unknown IPs with 404 or an empty object
    /// depending on deployment age; both count as a miss.
    pub async fn cached_blocklist(&self, ip: &str) -> Option<BlocklistRecord> {
        let response = self
            .client
            .get(format!("{}/api/neutrino/cache", self.base_url))
            .query(&[("ip", ip)])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, ip, "Blocklist cache read failed");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => parse_blocklist(value),
            Err(_) => None,
        }
    }

    /// Live blocklist lookup through the server-side provider proxy
    pub async fn live_blocklist(&self, ip: &str) -> Option<BlocklistRecord> {
        let response = self
            .client
            .get(format!("{}/api/neutrino/live", self.base_url))
            .query(&[("ip", ip)])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, ip, "Live blocklist lookup failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), ip, "Live blocklist lookup rejected");
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => parse_blocklist(value),
            Err(_) => None,
        }
    }

    /// Write a live blocklist result back to the cache
    pub async fn save_blocklist(&self, ip: &str, record: &BlocklistRecord) -> bool {
        let body = json!({ "ip": ip, "data": record });
        let response = self
            .client
            .post(format!("{}/api/neutrino/save", self.base_url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), ip, "Blocklist write-back rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, ip, "Blocklist write-back failed");
                false
            }
        }
    }

    /// Bump the server-side search counter.
    ///
    /// Failures are logged and swallowed; the dashboard keeps its optimistic
    /// local count either way.
    pub async fn record_search(&self) -> bool {
        let response = self
            .client
            .post(format!("{}/api/stats/increment-search", self.base_url))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Failed to record search");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record search");
                false
            }
        }
    }

    /// Total indicator rows, zero when the endpoint is unavailable
    pub async fn entry_count(&self) -> i64 {
        self.count_from("/api/stats/entries").await
    }

    /// Recorded search count, zero when the endpoint is unavailable
    pub async fn search_count(&self) -> i64 {
        self.count_from("/api/stats/searches").await
    }

    /// Indicator counts per category, empty when the endpoint is unavailable
    pub async fn category_breakdown(&self) -> std::collections::HashMap<String, i64> {
        let url = format!("{}/api/stats/type-breakdown", self.base_url);
        match self.get_json(&url).await {
            Ok(breakdown) => breakdown,
            Err(e) => {
                tracing::debug!(error = %e, "Category breakdown unavailable");
                Default::default()
            }
        }
    }

    /// All dashboard counters in one round of concurrent reads
    pub async fn dashboard_stats(&self) -> DashboardStats {
        let (entries, searches, categories) = tokio::join!(
            self.entry_count(),
            self.search_count(),
            self.category_breakdown(),
        );

        DashboardStats {
            entries,
            searches,
            categories,
        }
    }

    /// Latest CVE headlines from the server-side feed proxy, empty when the
    /// proxy or the upstream feed is down
    pub async fn cve_headlines(&self) -> Vec<CveHeadline> {
        let url = format!("{}/api/rss/cves", self.base_url);
        match self.get_json::<CveFeedResponse>(&url).await {
            Ok(body) => body.items.into_iter().map(CveItem::headline).collect(),
            Err(e) => {
                tracing::debug!(error = %e, "CVE feed unavailable");
                Vec::new()
            }
        }
    }

    async fn count_from(&self, path: &str) -> i64 {
        let url = format!("{}{}", self.base_url, path);
        match self.get_json::<CountResponse>(&url).await {
            Ok(body) => body.count,
            Err(e) => {
                tracing::debug!(error = %e, path, "Stats read failed, defaulting to zero");
                0
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }
}

/// An empty or null payload is a cache miss, not an empty record
fn parse_blocklist(value: Value) -> Option<BlocklistRecord> {
    match &value {
        Value::Object(map) if !map.is_empty() => serde_json::from_value(value).ok(),
        _ => None,
    }
}
