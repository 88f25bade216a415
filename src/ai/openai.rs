use super::{AiError, AiResult, GroupingProposal, Summarizer};
use crate::types::Answer;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;

const SUMMARIZE_SYSTEM_PROMPT: &str = "You summarize answers collected during a live Q&A session. \
    Write a short synthesis (3-4 sentences) of the common themes across the answers. \
    Plain prose only, no headings or bullet points, no preamble.";

const GROUPING_SYSTEM_PROMPT: &str = "You organize answers collected during a live Q&A session \
    into thematic groups. Respond with JSON only, no code fences, in the shape \
    {\"groups\": [{\"name\": \"...\", \"answer_ids\": [\"...\"]}]}. \
    Use the answer ids exactly as given. Every group needs a short, descriptive name. \
    Leave answers that fit no theme out of every group.";

/// OpenAI-backed summarization/grouping collaborator
pub struct OpenAiSummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model,
            timeout,
        }
    }

    async fn complete(&self, system: &str, user: String) -> AiResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| AiError::ApiError(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| AiError::ApiError(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| AiError::ApiError(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| AiError::Timeout(self.timeout))?
            .map_err(|e| AiError::ApiError(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AiError::ParseError("No content in response".to_string()))
    }
}

fn render_answers(answers: &[Answer], with_ids: bool) -> String {
    answers
        .iter()
        .map(|a| {
            if with_ids {
                format!("[{}] {}", a.id, a.text)
            } else {
                format!("- {}", a.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Models occasionally wrap JSON in markdown fences despite instructions
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, question: &str, answers: &[Answer]) -> AiResult<String> {
        let user = format!(
            "Question: {question}\n\nAnswers:\n{}",
            render_answers(answers, false)
        );
        self.complete(SUMMARIZE_SYSTEM_PROMPT, user).await
    }

    async fn group_answers(
        &self,
        question: &str,
        answers: &[Answer],
    ) -> AiResult<GroupingProposal> {
        let user = format!(
            "Question: {question}\n\nAnswers (id in brackets):\n{}",
            render_answers(answers, true)
        );
        let raw = self.complete(GROUPING_SYSTEM_PROMPT, user).await?;

        serde_json::from_str(strip_code_fences(&raw))
            .map_err(|e| AiError::ParseError(format!("{e}: {raw}")))
    }
}
