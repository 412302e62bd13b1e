//! HTTP client for the daemon's health API

use agent_lib::health::{HealthResponse, ReadinessResponse};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Client for the daemon's `/healthz` and `/readyz` endpoints
pub struct AgentClient {
    client: Client,
    base_url: Url,
}

impl AgentClient {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    /// GET a JSON document
    ///
    /// The health endpoints answer 503 with a body when something is wrong,
    /// so that status is parsed like a success.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to reach the daemon at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get("readyz").await
    }
}
