/// Model access: the single point of entry for generation and embedding calls.
///
/// ARCHITECTURAL RULE: No other module may call a model API directly.
/// Pipelines ask a `ModelBackend` for a `LanguageModel` / `Embedder` and only
/// ever talk to those traits.
///
/// No call is retried. Each client carries its configured timeout; a timeout
/// surfaces as `LlmError::Timeout` and the calling pipeline falls back.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub mod ollama;
pub mod openai;
pub mod prompts;

#[cfg(test)]
pub mod fake;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Embedding backend returned {actual} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("Model configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Maps a transport error, separating timeouts so logs say what happened.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Http(err)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-style prompt. Serializes to the `{role, content}`
/// shape both supported backends accept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// An embedding backend. Returns one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed(&[input.to_string()]).await?;
        vectors.pop().ok_or(LlmError::EmbeddingCount {
            expected: 1,
            actual: 0,
        })
    }
}

/// Resolves concrete backends. Each pipeline asks for its model while building
/// its chain, so implementations see exactly one call per chain build.
pub trait ModelBackend: Send + Sync {
    fn language_model(&self) -> Result<Arc<dyn LanguageModel>, LlmError>;

    fn embedder(&self) -> Result<Arc<dyn Embedder>, LlmError>;
}

/// Stateless, config-driven backend resolver.
///
/// Ollama is selected when the provider (or, for embeddings, the model name)
/// mentions "ollama"; everything else goes to the OpenAI-compatible API.
#[derive(Clone)]
pub struct ModelProvider {
    config: Config,
}

impl ModelProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn openai_key(&self) -> Result<String, LlmError> {
        self.config
            .openai_api_key
            .clone()
            .ok_or_else(|| LlmError::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

impl ModelBackend for ModelProvider {
    fn language_model(&self) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let llm = &self.config.llm;
        info!(model = %llm.model, provider = %llm.provider, "Initializing language model");

        if llm.provider.to_lowercase().contains("ollama") {
            let model = ollama::OllamaChat::new(
                &self.config.ollama.endpoint,
                &llm.model,
                llm.temperature,
                self.config.ollama_timeout(),
            )?;
            return Ok(Arc::new(model));
        }

        let model = openai::OpenAiChat::new(
            self.openai_key()?,
            &self.config.openai_base_url,
            &llm.model,
            llm.temperature,
            self.config.llm_timeout(),
        )?;
        Ok(Arc::new(model))
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>, LlmError> {
        let embedding = &self.config.embedding;
        info!(model = %embedding.model, "Initializing embedding model");

        let is_ollama = embedding.provider.to_lowercase().contains("ollama")
            || embedding.model.to_lowercase().contains("ollama");
        if is_ollama {
            let model = embedding
                .model
                .strip_prefix("ollama/")
                .unwrap_or(&embedding.model);
            let embedder = ollama::OllamaEmbedder::new(
                &self.config.ollama.endpoint,
                model,
                self.config.ollama_timeout(),
            )?;
            return Ok(Arc::new(embedder));
        }

        let embedder = openai::OpenAiEmbedder::new(
            self.openai_key()?,
            &self.config.openai_base_url,
            &embedding.model,
            self.config.llm_timeout(),
        )?;
        Ok(Arc::new(embedder))
    }
}

/// Builds the shared HTTP client with the backend's timeout baked in.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Reads a non-success body into an `Api` error.
pub(crate) async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LlmError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let provider = ModelProvider::new(Config::default());
        let err = provider.language_model().err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let mut config = Config::default();
        config.llm.provider = "ollama".to_string();
        config.llm.model = "llama3.2".to_string();
        config.embedding.model = "ollama/nomic-embed-text".to_string();
        let provider = ModelProvider::new(config);

        let model = provider.language_model().unwrap();
        assert_eq!(model.model_name(), "llama3.2");
        let embedder = provider.embedder().unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_openai_selected_with_key() {
        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());
        let provider = ModelProvider::new(config);
        assert_eq!(provider.language_model().unwrap().model_name(), "gpt-4o-mini");
        assert_eq!(
            provider.embedder().unwrap().model_name(),
            "text-embedding-3-small"
        );
    }
}
