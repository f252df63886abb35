//! Request orchestration: one lazily-built pipeline per operation.
//!
//! Every pipeline builds its chain on first use behind a `OnceCell`, so
//! concurrent first callers wait on a single build and all observe the same
//! chain. Validation failures are returned to the caller; anything else is
//! logged and turned into a fallback result carrying an `error` field.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::documents::DocumentLoader;
use crate::guardrails::{ContentClassifier, Guardrails};
use crate::llm_client::{LlmError, ModelBackend};
use crate::retrieval::{IndexError, IndexManager};

pub mod chat;
pub mod history;
pub mod job_match;
pub mod prompts;
pub mod summary;

#[cfg(test)]
pub mod testing;

pub use chat::{ChatPipeline, ChatResponse};
pub use job_match::{JobMatchPipeline, JobMatchResponse};
pub use summary::{SummaryPipeline, SummaryResponse, SummaryStyle};

/// Session identifier used when authentication is disabled.
pub const ANONYMOUS: &str = "anonymous";

/// Who is asking. Passed per call, never stored in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_code: String,
    pub company: String,
    pub session_id: String,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user_code: ANONYMOUS.to_string(),
            company: ANONYMOUS.to_string(),
            session_id: ANONYMOUS.to_string(),
        }
    }
}

/// Everything that can go wrong after validation. Never reaches the client
/// as an error status; pipelines convert it into a fallback result.
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("retrieval index unavailable: {0}")]
    Index(#[from] IndexError),

    #[error("no candidate documents could be loaded")]
    NoDocuments,
}

/// The three process-wide pipelines plus what they share.
pub struct Pipelines {
    pub chat: ChatPipeline,
    pub summary: SummaryPipeline,
    pub job_match: JobMatchPipeline,
    pub guardrails: Arc<Guardrails>,
    pub index: Arc<IndexManager>,
}

impl Pipelines {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ModelBackend>,
        classifier: Arc<dyn ContentClassifier>,
    ) -> Self {
        let guardrails = Arc::new(Guardrails::new(config, classifier));
        let index = Arc::new(IndexManager::new(config, backend.clone()));

        Self {
            chat: ChatPipeline::new(config, backend.clone(), index.clone(), guardrails.clone()),
            summary: SummaryPipeline::new(
                config,
                backend.clone(),
                DocumentLoader::new(&config.data),
                guardrails.clone(),
            ),
            job_match: JobMatchPipeline::new(config, backend, index.clone(), guardrails.clone()),
            guardrails,
            index,
        }
    }
}

/// Joins retrieved or loaded documents into one prompt context block.
pub(crate) fn join_context<'a>(contents: impl IntoIterator<Item = &'a str>) -> String {
    contents.into_iter().collect::<Vec<_>>().join("\n\n")
}
