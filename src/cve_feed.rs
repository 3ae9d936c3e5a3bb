//! CVE headline feed, proxied from an upstream RSS source

use std::time::Duration;

use anyhow::{Context, Result};
use quick_xml::de::from_str;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CVE_FEED_URL: &str = "https://cvefeed.io/rssfeed/latest.xml";

/// Headlines per response; the dashboard only shows a short ticker
const MAX_ITEMS: usize = 10;

/// Feed item as served by the proxy. Fields stay optional and unnormalized;
/// display fallbacks are the consumer's concern.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
}

/// Fetches and parses the upstream CVE RSS feed
#[derive(Clone)]
pub struct CveFeedClient {
    client: Client,
    feed_url: String,
}

impl CveFeedClient {
    pub fn new() -> Self {
        Self::with_feed_url(CVE_FEED_URL)
    }

    /// Point the client at a different feed
    pub fn with_feed_url(feed_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            feed_url: feed_url.into(),
        }
    }

    /// Fetch the feed and return its leading items.
    ///
    /// An unreachable or failing upstream is an error; a fetched document
    /// that parses to nothing is an empty list.
    pub async fn latest(&self) -> Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("Failed to fetch the CVE feed")?;

        if !response.status().is_success() {
            anyhow::bail!("CVE feed error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read the CVE feed")?;

        Ok(parse_items(&body))
    }
}

impl Default for CveFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse RSS 2.0 into feed items, tolerating missing fields. An unparsable
/// document yields no items rather than an error.
fn parse_items(xml: &str) -> Vec<FeedItem> {
    let rss: Rss = match from_str(xml) {
        Ok(rss) => rss,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse CVE feed XML");
            return Vec::new();
        }
    };

    rss.channel
        .items
        .into_iter()
        .take(MAX_ITEMS)
        .map(|item| FeedItem {
            title: item.title,
            link: item.link,
        })
        .collect()
}
