mod openai;

pub use openai::OpenAiSummarizer;

use crate::types::{Answer, AnswerId};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Result type for AI collaborator operations
pub type AiResult<T> = Result<T, AiError>;

/// Errors from the summarization/grouping collaborator. These are never
/// fatal to a session: the triggering phase transition has already
/// completed and broadcast by the time one of these surfaces.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("response parsing failed: {0}")]
    ParseError(String),
}

/// A grouping proposed by the collaborator: named groups of answer ids plus
/// an implicit "everything else" bucket. The proposal is untrusted; the
/// grouping reconciler re-validates it against the question's real answers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupingProposal {
    pub groups: Vec<ProposedGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedGroup {
    pub name: String,
    pub answer_ids: Vec<AnswerId>,
}

/// External summarization/grouping collaborator. Both calls are
/// side-effect-free and independently retryable; the engine invokes them
/// from detached tasks so they never block a phase transition.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, question: &str, answers: &[Answer]) -> AiResult<String>;

    async fn group_answers(&self, question: &str, answers: &[Answer])
        -> AiResult<GroupingProposal>;
}

/// Configuration for the AI collaborator
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl AiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let timeout = std::env::var("AI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Self {
            api_key,
            model,
            timeout,
        }
    }

    /// Build the collaborator, or fail when no API key is configured
    pub fn build(&self) -> AiResult<OpenAiSummarizer> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            AiError::ConfigError("No AI collaborator configured. Set OPENAI_API_KEY".to_string())
        })?;
        Ok(OpenAiSummarizer::new(api_key, self.model.clone(), self.timeout))
    }
}
