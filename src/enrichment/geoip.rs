//! GeoIP enrichment over the ip-api.com JSON endpoint

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::models::GeoInfo;

const GEOIP_API_URL: &str = "http://ip-api.com";

/// ip-api.com wire response; `status` is "success" or "fail"
#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    isp: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl GeoIpResponse {
    fn into_geo_info(self) -> Option<GeoInfo> {
        if self.status == "fail" {
            return None;
        }

        Some(GeoInfo {
            ip: self.query,
            country: self.country,
            city: self.city,
            isp: self.isp,
            lat: self.lat,
            lon: self.lon,
        })
    }
}

/// Client for the free ip-api.com lookup endpoint
pub struct GeoIpClient {
    client: Client,
    base_url: String,
}

impl GeoIpClient {
    pub fn new() -> Self {
        Self::with_base_url(GEOIP_API_URL)
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Locate an IP. Transport failures, bad statuses, undecodable bodies,
    /// and provider "fail" answers all come back as `None`.
    pub async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        let url = format!("{}/json/{}", self.base_url, ip);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, ip, "GeoIP request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), ip, "GeoIP request rejected");
            return None;
        }

        match response.json::<GeoIpResponse>().await {
            Ok(body) => body.into_geo_info(),
            Err(e) => {
                tracing::debug!(error = %e, ip, "Undecodable GeoIP response");
                None
            }
        }
    }
}

impl Default for GeoIpClient {
    fn default() -> Self {
        Self::new()
    }
}
