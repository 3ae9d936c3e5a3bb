//! The search workflow: classify, search, enrich, record

use crate::classify::classify;
use crate::client::{DashboardClient, SearchError};
use crate::enrichment::geoip::GeoIpClient;
use crate::enrichment::Enricher;
use crate::models::{IpEnrichment, LookupResult, QueryKind};

/// Drives one search action end to end.
///
/// The primary search is the gate: if it cannot produce a record the whole
/// lookup fails and nothing else runs. Enrichment applies only to IP-shaped
/// queries and never fails a lookup. The search counter is bumped once per
/// completed lookup, found or fallback, never for an aborted one.
pub struct LookupService {
    dashboard: DashboardClient,
    enricher: Enricher,
}

impl LookupService {
    pub fn new(dashboard: DashboardClient, geoip: GeoIpClient) -> Self {
        let enricher = Enricher::new(dashboard.clone(), geoip);
        Self {
            dashboard,
            enricher,
        }
    }

    /// Look up a raw query and assemble the view for it
    pub async fn lookup(&self, raw: &str) -> Result<LookupResult, SearchError> {
        let query = classify(raw);
        tracing::debug!(query = %query.raw, kind = %query.kind, "Running lookup");

        // The raw query goes to the search; enrichment gets the normalized
        // form with any CIDR suffix stripped.
        let indicator = self.dashboard.search(&query.raw).await?;

        let IpEnrichment { geo, blocklist } = match query.kind {
            QueryKind::Ip => self.enricher.enrich(&query.normalized).await,
            QueryKind::Other => IpEnrichment::default(),
        };

        let result = LookupResult {
            indicator,
            geo,
            blocklist,
        };

        self.dashboard.record_search().await;

        Ok(result)
    }
}
