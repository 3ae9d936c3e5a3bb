//! Live IP blocklist lookups against the Neutrino API

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

const NEUTRINO_API_URL: &str = "https://neutrinoapi.net";

/// Credentialed client for the Neutrino ip-blocklist endpoint.
///
/// Lives server-side so the credentials never reach dashboard clients.
#[derive(Clone)]
pub struct NeutrinoClient {
    client: Client,
    base_url: String,
    user_id: String,
    api_key: String,
}

impl NeutrinoClient {
    pub fn new(user_id: String, api_key: String) -> Self {
        Self::with_base_url(NEUTRINO_API_URL, user_id, api_key)
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(base_url: impl Into<String>, user_id: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
            api_key,
        }
    }

    /// Query the ip-blocklist endpoint, returning the provider payload
    /// verbatim so callers can cache it without loss
    pub async fn ip_blocklist(&self, ip: &str) -> Result<Value> {
        let form = [
            ("user-id", self.user_id.as_str()),
            ("api-key", self.api_key.as_str()),
            ("ip", ip),
        ];

        let response = self
            .client
            .post(format!("{}/ip-blocklist", self.base_url))
            .form(&form)
            .send()
            .await
            .context("Failed to reach the Neutrino API")?;

        if !response.status().is_success() {
            anyhow::bail!("Neutrino API error: {}", response.status());
        }

        response
            .json::<Value>()
            .await
            .context("Failed to parse Neutrino response")
    }
}
