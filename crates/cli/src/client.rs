//! API client for the k8spulse agent

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the agent's HTTP surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.base_url.join(path).context("Invalid path")?;

        self.client
            .get(url)
            .send()
            .await
            .context("Failed to send request")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET that treats 404 as "nothing there yet"
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.send(path).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(response.json().await.context("Failed to parse response")?))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("API error ({}): {}", status, body);
            }
        }
    }

    /// GET for probe endpoints, which answer 503 with a JSON body
    pub async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn history(&self, hours: u64) -> Result<Vec<HistoryRecord>> {
        self.get(&format!("api/v1/history?hours={}", hours)).await
    }

    pub async fn latest(&self) -> Result<Option<HistoryRecord>> {
        self.get_optional("api/v1/history/latest").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_probe("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_probe("readyz").await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub total_deployments: i64,
    pub deployments_with_replicas: i64,
    pub deployments_with_zero_replicas: i64,
    pub deployments_with_exact_replicas: i64,
    pub deployments_with_crashloopbackoff: i64,
    pub deployments_with_recent_start: i64,
    pub cpu_used_percentage: f64,
    pub cpu_requested_percentage: f64,
    pub memory_used_percentage: f64,
    pub memory_requested_percentage: f64,
    #[serde(default)]
    pub node_issues: Vec<NodeIssue>,
    #[serde(default)]
    pub zombie_processes: Vec<ZombieProcess>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIssue {
    pub name: String,
    pub status: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZombieProcess {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub pid: i64,
    pub process_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
