//! Blocklist feed collectors

pub mod plaintext;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::MissedTickBehavior;

use crate::models::NewIndicator;
use crate::storage::IndicatorStore;

/// How often the background task re-runs all collectors
pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_secs(600);

/// Trait for feed collectors
#[async_trait]
pub trait FeedCollector: Send + Sync {
    /// Feed name, recorded as each indicator's source
    fn name(&self) -> &'static str;

    /// Fetch indicators from the feed
    async fn fetch(&self) -> Result<Vec<NewIndicator>>;
}

/// Run every collector once and import what it returns.
///
/// Feeds fetch concurrently; a failing feed is logged and skipped so one
/// dead upstream never blocks the others. Returns the imported row count.
pub async fn run_collectors(collectors: &[Box<dyn FeedCollector>], store: &IndicatorStore) -> u64 {
    let results = join_all(collectors.iter().map(|collector| collector.fetch())).await;

    let mut total = 0;
    for (collector, result) in collectors.iter().zip(results) {
        let indicators = match result {
            Ok(indicators) => indicators,
            Err(e) => {
                tracing::warn!(feed = collector.name(), error = %e, "Feed fetch failed");
                continue;
            }
        };

        match store.import_indicators(&indicators).await {
            Ok(imported) => {
                tracing::info!(feed = collector.name(), imported, "Feed imported");
                total += imported;
            }
            Err(e) => {
                tracing::warn!(feed = collector.name(), error = %e, "Feed import failed");
            }
        }
    }

    total
}

/// Re-run all collectors on a fixed interval, starting immediately.
/// Runs until the process exits.
pub async fn run_periodic(
    collectors: Vec<Box<dyn FeedCollector>>,
    store: IndicatorStore,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let imported = run_collectors(&collectors, &store).await;
        tracing::info!(imported, "Feed collection round complete");
    }
}
