//! Job-description matching: retrieve the candidate's most relevant chunks
//! for a pasted job posting and ask the model for a fit assessment.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::prompts::{with_context, JOB_MATCH_SYSTEM, JOB_MATCH_TEMPLATE};
use super::{join_context, GenerationFailure, RequestContext};
use crate::config::Config;
use crate::documents::{Document, DocumentSource};
use crate::guardrails::{Guardrails, ReadingBudget, ValidationError};
use crate::llm_client::prompts::{with_candidate, GROUNDING_INSTRUCTION};
use crate::llm_client::{ChatMessage, Embedder, LanguageModel, ModelBackend};
use crate::retrieval::{IndexManager, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct JobMatchResponse {
    pub analysis: String,
    pub job_source: DocumentSource,
    /// Source tag of every retrieved chunk, in rank order.
    pub relevant_sections: Vec<DocumentSource>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct JobMatchChain {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    system_prompt: String,
    template: String,
}

pub struct JobMatchPipeline {
    backend: Arc<dyn ModelBackend>,
    index: Arc<IndexManager>,
    guardrails: Arc<Guardrails>,
    candidate_name: String,
    k: usize,
    fallback: String,
    chain: OnceCell<Arc<JobMatchChain>>,
}

impl JobMatchPipeline {
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
            candidate_name: config.candidate.name.clone(),
            k: config.retrieval.k,
            fallback: config.responses.job_match_fallback.clone(),
            chain: OnceCell::new(),
        }
    }

    /// `document` normally comes from `documents::process_job_text`; its
    /// content is checked again here before any retrieval happens.
    pub async fn invoke(
        &self,
        document: &Document,
        ctx: &RequestContext,
    ) -> Result<JobMatchResponse, ValidationError> {
        let started = Instant::now();
        info!(
            session = %ctx.session_id,
            company = %ctx.company,
            chars = document.content.len(),
            "Starting job matching analysis"
        );

        self.guardrails.validate_job_text(&document.content)?;

        let response = match self.analyze(&document.content).await {
            Ok((analysis, relevant_sections)) => {
                info!(
                    sections = relevant_sections.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job matching analysis completed"
                );
                JobMatchResponse {
                    analysis,
                    job_source: document.metadata.source,
                    relevant_sections,
                    timestamp: Utc::now(),
                    error: None,
                }
            }
            Err(e) => {
                error!("Job matching analysis error: {e}");
                JobMatchResponse {
                    analysis: self.fallback.clone(),
                    job_source: document.metadata.source,
                    relevant_sections: Vec::new(),
                    timestamp: Utc::now(),
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(response)
    }

    async fn chain(&self) -> Result<Arc<JobMatchChain>, GenerationFailure> {
        self.chain
            .get_or_try_init(|| async {
                info!("Initializing job matching analysis chain");
                let index = self.index.get_or_build().await?;
                let model = self.backend.language_model()?;
                let embedder = self.backend.embedder()?;
                Ok::<_, GenerationFailure>(Arc::new(JobMatchChain {
                    model,
                    embedder,
                    index,
                    system_prompt: format!("{JOB_MATCH_SYSTEM}\n{GROUNDING_INSTRUCTION}"),
                    template: with_candidate(JOB_MATCH_TEMPLATE, &self.candidate_name),
                }))
            })
            .await
            .cloned()
    }

    async fn analyze(
        &self,
        job_text: &str,
    ) -> Result<(String, Vec<DocumentSource>), GenerationFailure> {
        let chain = self.chain().await?;

        let query_vector = chain.embedder.embed_one(job_text).await?;
        let hits = chain.index.search(&query_vector, self.k);
        info!(retrieved = hits.len(), "Retrieved relevant candidate sections");

        let job_block = format!("JOB DESCRIPTION:\n{job_text}");
        let context = join_context(
            std::iter::once(job_block.as_str())
                .chain(hits.iter().map(|hit| hit.document.content.as_str())),
        );
        let messages = [
            ChatMessage::system(chain.system_prompt.clone()),
            ChatMessage::user(with_context(&chain.template, &context)),
        ];

        let raw = chain.model.complete(&messages).await?;
        let analysis = self
            .guardrails
            .validate_output(&raw, ReadingBudget::Report)
            .await;
        let sections = hits
            .iter()
            .map(|hit| hit.document.metadata.source)
            .collect();
        Ok((analysis, sections))
    }
}
