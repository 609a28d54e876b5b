//! External collaborators: recommendations, audit events and publishing

mod castai;
mod git;
mod openai;

pub use castai::{AuditEventsClient, CAST_AI_API_KEY_VAR, CAST_AI_CLUSTER_ID_VAR, DEFAULT_AUDIT_EVENT_LIMIT};
pub use git::GitPublisher;
pub use openai::{OpenAiRecommender, Recommender, OPENAI_API_KEY_VAR};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("environment variable {variable} is not set")]
    MissingCredential { variable: &'static str },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response contained no usable content")]
    EmptyResponse,

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Read a non-empty environment variable
pub fn credential_from_env(variable: &'static str) -> Option<String> {
    std::env::var(variable).ok().filter(|v| !v.trim().is_empty())
}
