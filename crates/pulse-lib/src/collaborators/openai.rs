//! Recommendations from an OpenAI-compatible chat completion endpoint

use super::{credential_from_env, CollaboratorError, CollaboratorResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You are an assistant that provides actionable recommendations based on \
Kubernetes cluster reports. Consider that CAST AI is used to analyze resources, so taints and node \
churn can be normal when dynamic auto-scaling is active.";

const USER_PROMPT: &str = "Below is a Kubernetes cluster report. Analyze it and provide a concise and \
actionable recommendation to improve the overall health of the cluster. Focus on issues related to \
deployments, pods, metrics server and CrashLoopBackOff. Return only an HTML fragment suitable for \
innerHTML, with good styling, without ``` or any other code block delimiters.";

/// Produces an HTML recommendation for a rendered report
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, report_path: &Path, model: &str) -> CollaboratorResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    top_p: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiRecommender {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiRecommender {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> CollaboratorResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Public endpoint, key from `OPENAI_API_KEY`
    pub fn from_env() -> CollaboratorResult<Self> {
        Self::new(DEFAULT_BASE_URL, credential_from_env(OPENAI_API_KEY_VAR))
    }
}

#[async_trait]
impl Recommender for OpenAiRecommender {
    async fn recommend(&self, report_path: &Path, model: &str) -> CollaboratorResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::MissingCredential {
                variable: OPENAI_API_KEY_VAR,
            })?;

        let report = tokio::fs::read_to_string(report_path).await?;
        info!(model = %model, report = %report_path.display(), "Requesting recommendation");

        let request = ChatRequest {
            model,
            temperature: 0.7,
            top_p: 1.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("{USER_PROMPT}\n\n{report}"),
                },
            ],
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CollaboratorError::EmptyResponse)?;

        debug!(bytes = content.len(), "Recommendation received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn report_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("staging_statistics.html");
        tokio::fs::write(&path, "<h1>staging</h1>").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = report_file(&dir).await;
        let recommender = OpenAiRecommender::new(server.url(), None).unwrap();

        let err = recommender.recommend(&path, "gpt-4o").await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::MissingCredential {
                variable: OPENAI_API_KEY_VAR
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "gpt-4o"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [
                    {"message": {"role": "assistant", "content": "<p>Fix cart</p>"}},
                    {"message": {"role": "assistant", "content": "<p>ignored</p>"}}
                ]}"#,
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = report_file(&dir).await;
        let recommender = OpenAiRecommender::new(server.url(), Some("sk-test".to_string())).unwrap();

        let html = recommender.recommend(&path, "gpt-4o").await.unwrap();
        assert_eq!(html, "<p>Fix cart</p>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = report_file(&dir).await;
        let recommender = OpenAiRecommender::new(server.url(), Some("sk-test".to_string())).unwrap();

        let err = recommender.recommend(&path, "gpt-4o").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Http(_)));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let path = report_file(&dir).await;
        let recommender = OpenAiRecommender::new(server.url(), Some("sk-test".to_string())).unwrap();

        let err = recommender.recommend(&path, "gpt-4o").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::EmptyResponse));
    }
}
