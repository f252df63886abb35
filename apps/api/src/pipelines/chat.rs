//! Conversational RAG over the candidate's documents.
//!
//! Flow: validate → record human turn → (rewrite follow-up into a standalone
//! query) → retrieve top-k → generate with history → validate output →
//! record assistant turn.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::history::{HistoryStore, Turn};
use super::prompts::{with_context, CHAT_SYSTEM_TEMPLATE, CONTEXTUALIZE_INSTRUCTION};
use super::{join_context, GenerationFailure, RequestContext};
use crate::config::Config;
use crate::documents::Document;
use crate::guardrails::{Guardrails, ReadingBudget, ValidationError};
use crate::llm_client::prompts::{with_candidate, GROUNDING_INSTRUCTION, PROFESSIONAL_TONE};
use crate::llm_client::{ChatMessage, Embedder, LanguageModel, ModelBackend};
use crate::retrieval::{IndexManager, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Built once, immutable afterwards.
struct ChatChain {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    /// Candidate name filled in; `{context}` still open.
    system_prompt: String,
}

pub struct ChatPipeline {
    backend: Arc<dyn ModelBackend>,
    index: Arc<IndexManager>,
    guardrails: Arc<Guardrails>,
    history: HistoryStore,
    candidate_name: String,
    k: usize,
    fallback: String,
    chain: OnceCell<Arc<ChatChain>>,
}

impl ChatPipeline {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ModelBackend>,
        index: Arc<IndexManager>,
        guardrails: Arc<Guardrails>,
    ) -> Self {
        Self {
            backend,
            index,
            guardrails,
            history: HistoryStore::new(config.max_history_turns),
            candidate_name: config.candidate.name.clone(),
            k: config.retrieval.k,
            fallback: with_candidate(&config.responses.chat_fallback, &config.candidate.name),
            chain: OnceCell::new(),
        }
    }

    pub async fn invoke(
        &self,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<ChatResponse, ValidationError> {
        let started = Instant::now();
        info!(
            session = %ctx.session_id,
            company = %ctx.company,
            chars = query.len(),
            "Processing chat query"
        );

        let query = self.guardrails.validate_query(query).await?;
        let history = self
            .history
            .snapshot_and_push(&ctx.session_id, Turn::human(&query));

        let response = match self.respond(&query, &history).await {
            Ok((answer, sources)) => ChatResponse {
                answer,
                sources,
                error: None,
            },
            Err(e) => {
                error!(session = %ctx.session_id, "Chat completion failed: {e}");
                ChatResponse {
                    answer: self.fallback.clone(),
                    sources: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        self.history
            .push(&ctx.session_id, Turn::assistant(&response.answer));
        info!(
            session = %ctx.session_id,
            sources = response.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completion processed"
        );
        Ok(response)
    }

    /// The session's turns, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        self.history.snapshot(session_id)
    }

    pub fn clear_history(&self, session_id: &str) {
        self.history.clear(session_id);
    }

    async fn chain(&self) -> Result<Arc<ChatChain>, GenerationFailure> {
        self.chain
            .get_or_try_init(|| async {
                info!("Initializing RAG QA chain");
                let index = self.index.get_or_build().await?;
                let model = self.backend.language_model()?;
                let embedder = self.backend.embedder()?;
                let system_prompt = format!(
                    "{}\n\n{}\n{}",
                    with_candidate(CHAT_SYSTEM_TEMPLATE, &self.candidate_name),
                    GROUNDING_INSTRUCTION,
                    PROFESSIONAL_TONE
                );
                info!(model = model.model_name(), "RAG QA chain initialization completed");
                Ok::<_, GenerationFailure>(Arc::new(ChatChain {
                    model,
                    embedder,
                    index,
                    system_prompt,
                }))
            })
            .await
            .cloned()
    }

    async fn respond(
        &self,
        query: &str,
        history: &[Turn],
    ) -> Result<(String, Vec<Document>), GenerationFailure> {
        let chain = self.chain().await?;

        let search_query = if history.is_empty() {
            query.to_string()
        } else {
            let mut messages: Vec<ChatMessage> = history.iter().map(Turn::to_message).collect();
            messages.push(ChatMessage::user(query));
            messages.push(ChatMessage::user(CONTEXTUALIZE_INSTRUCTION));
            chain.model.complete(&messages).await?
        };

        let query_vector = chain.embedder.embed_one(&search_query).await?;
        let sources: Vec<Document> = chain
            .index
            .search(&query_vector, self.k)
            .into_iter()
            .map(|hit| hit.document)
            .collect();

        let context = join_context(sources.iter().map(|doc| doc.content.as_str()));
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(with_context(&chain.system_prompt, &context)));
        messages.extend(history.iter().map(Turn::to_message));
        messages.push(ChatMessage::user(query));

        let raw = chain.model.complete(&messages).await?;
        let answer = self
            .guardrails
            .validate_output(&raw, ReadingBudget::Chat)
            .await;
        Ok((answer, sources))
    }
}
