//! CAST AI audit log client

use super::{credential_from_env, CollaboratorError, CollaboratorResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const CAST_AI_API_KEY_VAR: &str = "CAST_AI_API_KEY";
pub const CAST_AI_CLUSTER_ID_VAR: &str = "CAST_AI_CLUSTER_ID";
pub const DEFAULT_AUDIT_EVENT_LIMIT: u32 = 50;

const DEFAULT_BASE_URL: &str = "https://api.cast.ai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct AuditPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Fetches the latest audit events of one cluster.
///
/// Events are passed through as raw JSON; they are only displayed, never
/// persisted.
pub struct AuditEventsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    cluster_id: Option<String>,
}

impl AuditEventsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        cluster_id: Option<String>,
    ) -> CollaboratorResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            cluster_id,
        })
    }

    pub fn from_env() -> CollaboratorResult<Self> {
        Self::new(
            DEFAULT_BASE_URL,
            credential_from_env(CAST_AI_API_KEY_VAR),
            credential_from_env(CAST_AI_CLUSTER_ID_VAR),
        )
    }

    pub async fn fetch_audit_events(&self, limit: u32) -> CollaboratorResult<Vec<serde_json::Value>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::MissingCredential {
                variable: CAST_AI_API_KEY_VAR,
            })?;
        let cluster_id = self
            .cluster_id
            .as_deref()
            .ok_or(CollaboratorError::MissingCredential {
                variable: CAST_AI_CLUSTER_ID_VAR,
            })?;

        let limit = limit.to_string();
        let page: AuditPage = self
            .client
            .get(format!("{}/v1/audit", self.base_url))
            .query(&[("page.limit", limit.as_str()), ("clusterId", cluster_id)])
            .header("accept", "application/json")
            .header("X-API-Key", api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(cluster_id = %cluster_id, events = page.items.len(), "Fetched audit events");
        Ok(page.items)
    }
}
