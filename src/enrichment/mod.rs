//! IP enrichment orchestration
//!
//! GeoIP and blocklist data are fetched concurrently. Blocklist lookups go
//! through a read-through cache: a cached record is authoritative, a miss
//! triggers one live lookup whose result is written back in the background.

pub mod geoip;
pub mod neutrino;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::client::DashboardClient;
use crate::enrichment::geoip::GeoIpClient;
use crate::models::{BlocklistRecord, IpEnrichment};

/// Pending live lookups, keyed by normalized IP. Concurrent cache misses for
/// one IP share a single live call through the cell.
type InFlightMap = Mutex<HashMap<String, Arc<OnceCell<Option<BlocklistRecord>>>>>;

/// Coordinates GeoIP and blocklist enrichment for IP queries
pub struct Enricher {
    dashboard: DashboardClient,
    geoip: GeoIpClient,
    in_flight: InFlightMap,
}

impl Enricher {
    pub fn new(dashboard: DashboardClient, geoip: GeoIpClient) -> Self {
        Self {
            dashboard,
            geoip,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Enrich a normalized IP.
    ///
    /// Every failure is field-local: a dead GeoIP provider never hides
    /// blocklist data, and vice versa.
    pub async fn enrich(&self, ip: &str) -> IpEnrichment {
        let (geo, blocklist) = tokio::join!(self.geoip.lookup(ip), self.blocklist(ip));
        IpEnrichment { geo, blocklist }
    }

    /// Read-through blocklist lookup: the cache answers when it can, a miss
    /// falls through to one de-duplicated live call.
    async fn blocklist(&self, ip: &str) -> Option<BlocklistRecord> {
        if let Some(cached) = self.dashboard.cached_blocklist(ip).await {
            tracing::debug!(ip, "Blocklist cache hit");
            return Some(cached);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(ip.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let record = cell
            .get_or_init(|| async {
                let record = self.dashboard.live_blocklist(ip).await;

                if let Some(record) = &record {
                    // Write-back runs in the background; the lookup result
                    // does not wait on it.
                    let dashboard = self.dashboard.clone();
                    let ip = ip.to_string();
                    let record = record.clone();
                    tokio::spawn(async move {
                        dashboard.save_blocklist(&ip, &record).await;
                    });
                }

                record
            })
            .await
            .clone();

        // Drop the cell so the next miss consults the cache again instead of
        // pinning this result forever.
        self.in_flight.lock().await.remove(ip);

        record
    }
}
