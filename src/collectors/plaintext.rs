//! Plaintext blocklist feeds: one indicator per line, `#` comments

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::collectors::FeedCollector;
use crate::models::NewIndicator;

const FEODO_TRACKER_IPS: &str = "https://feodotracker.abuse.ch/downloads/ipblocklist.txt";
const ET_COMPROMISED_IPS: &str = "https://rules.emergingthreats.net/blockrules/compromised-ips.txt";
const SPAMHAUS_DROP: &str = "https://www.spamhaus.org/drop/drop.txt";
const CINS_ARMY: &str = "https://cinsscore.com/list/ci-badguys.txt";
const TOR_EXIT_NODES: &str = "https://check.torproject.org/torbulkexitlist";

/// A line-per-IP blocklist feed with fixed metadata for every row
pub struct PlaintextFeed {
    name: &'static str,
    url: String,
    category: &'static str,
    severity: &'static str,
    notes: &'static str,
    client: Client,
}

impl PlaintextFeed {
    pub fn new(
        name: &'static str,
        url: impl Into<String>,
        category: &'static str,
        severity: &'static str,
        notes: &'static str,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name,
            url: url.into(),
            category,
            severity,
            notes,
            client,
        }
    }

    fn parse(&self, text: &str) -> Vec<NewIndicator> {
        let mut indicators = vec![];

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Spamhaus-style lists append "; SBL123" after the netblock
            let token = line.split([' ', '\t', ';']).next().unwrap_or(line).trim();
            let addr = token.split('/').next().unwrap_or(token);

            if addr.parse::<Ipv4Addr>().is_ok() {
                indicators.push(NewIndicator {
                    indicator_type: "ip".to_string(),
                    value: token.to_string(),
                    category: self.category.to_string(),
                    source: self.name.to_string(),
                    severity: self.severity.to_string(),
                    notes: self.notes.to_string(),
                });
            }
        }

        indicators
    }
}

#[async_trait]
impl FeedCollector for PlaintextFeed {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self) -> Result<Vec<NewIndicator>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch feed")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: {}", self.url, response.status());
        }

        let text = response.text().await?;
        Ok(self.parse(&text))
    }
}

/// The public IP blocklists imported out of the box
pub fn default_feeds() -> Vec<Box<dyn FeedCollector>> {
    vec![
        Box::new(PlaintextFeed::new(
            "feodo_tracker",
            FEODO_TRACKER_IPS,
            "botnet",
            "High",
            "Feodo Tracker botnet C2 list",
        )),
        Box::new(PlaintextFeed::new(
            "emerging_threats",
            ET_COMPROMISED_IPS,
            "compromised",
            "High",
            "Emerging Threats compromised hosts",
        )),
        Box::new(PlaintextFeed::new(
            "spamhaus_drop",
            SPAMHAUS_DROP,
            "spam",
            "High",
            "Spamhaus DROP netblocks",
        )),
        Box::new(PlaintextFeed::new(
            "cins_army",
            CINS_ARMY,
            "scanner",
            "Medium",
            "CINS Army aggressive scanners",
        )),
        Box::new(PlaintextFeed::new(
            "tor_exit_nodes",
            TOR_EXIT_NODES,
            "tor",
            "Low",
            "Tor exit node",
        )),
    ]
}
