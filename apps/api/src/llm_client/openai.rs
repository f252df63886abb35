//! OpenAI-compatible chat, embedding, and moderation clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_error, http_client, ChatMessage, Embedder, LanguageModel, LlmError};

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

fn require_key(api_key: &str) -> Result<(), LlmError> {
    if api_key.trim().is_empty() {
        return Err(LlmError::Config("missing OpenAI API key".to_string()));
    }
    Ok(())
}

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        require_key(&api_key)?;
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint(base_url, "chat/completions"),
            api_key,
            model: model.to_string(),
            temperature,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Chat completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        require_key(&api_key)?;
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint(base_url, "embeddings"),
            api_key,
            model: model.to_string(),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&text)?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(LlmError::EmbeddingCount {
                expected: inputs.len(),
                actual: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Category scores returned by the moderation endpoint, flattened.
#[derive(Debug, Clone, Default)]
pub struct ModerationResult {
    pub flagged: bool,
    /// Highest score across all categories, 0.0 to 1.0.
    pub max_score: f32,
    /// Categories the endpoint flagged.
    pub categories: Vec<String>,
}

pub struct OpenAiModeration {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiModeration {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        require_key(&api_key)?;
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint(base_url, "moderations"),
            api_key,
            timeout,
        })
    }

    pub async fn moderate(&self, text: &str) -> Result<ModerationResult, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;
        let parsed: ModerationResponse = serde_json::from_str(&text)?;
        let result = parsed.results.into_iter().next().ok_or(LlmError::EmptyContent)?;
        Ok(result.into())
    }
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationEntry>,
}

#[derive(Debug, Deserialize)]
struct ModerationEntry {
    flagged: bool,
    categories: std::collections::HashMap<String, bool>,
    category_scores: std::collections::HashMap<String, f32>,
}

impl From<ModerationEntry> for ModerationResult {
    fn from(entry: ModerationEntry) -> Self {
        let max_score = entry
            .category_scores
            .values()
            .copied()
            .fold(0.0_f32, f32::max);
        let mut categories: Vec<String> = entry
            .categories
            .into_iter()
            .filter(|(_, hit)| *hit)
            .map(|(name, _)| name)
            .collect();
        categories.sort();
        ModerationResult {
            flagged: entry.flagged,
            max_score,
            categories,
        }
    }
}
