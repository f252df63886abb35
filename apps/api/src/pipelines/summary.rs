//! Professional summary generation. Stateless: every call reads the full
//! document set fresh and stuffs it into one prompt.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::prompts::{summary_style_instruction, with_context, SUMMARY_TEMPLATE};
use super::{join_context, GenerationFailure, RequestContext};
use crate::config::Config;
use crate::documents::DocumentLoader;
use crate::guardrails::{Guardrails, ReadingBudget};
use crate::llm_client::prompts::{with_candidate, GROUNDING_INSTRUCTION, PROFESSIONAL_TONE};
use crate::llm_client::{ChatMessage, LanguageModel, ModelBackend};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    #[default]
    Bullet,
    Paragraph,
    Executive,
}

impl SummaryStyle {
    /// Unknown or missing styles fall back to `Bullet`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("bullet") => SummaryStyle::Bullet,
            Some("paragraph") => SummaryStyle::Paragraph,
            Some("executive") => SummaryStyle::Executive,
            Some(other) => {
                warn!("Unknown summary style '{other}', using bullet");
                SummaryStyle::Bullet
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Bullet => "bullet",
            SummaryStyle::Paragraph => "paragraph",
            SummaryStyle::Executive => "executive",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub style: SummaryStyle,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct SummaryChain {
    model: Arc<dyn LanguageModel>,
    /// Candidate name filled in; style and context still open.
    template: String,
}

pub struct SummaryPipeline {
    backend: Arc<dyn ModelBackend>,
    loader: DocumentLoader,
    guardrails: Arc<Guardrails>,
    candidate_name: String,
    fallback: String,
    chain: OnceCell<Arc<SummaryChain>>,
}

impl SummaryPipeline {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ModelBackend>,
        loader: DocumentLoader,
        guardrails: Arc<Guardrails>,
    ) -> Self {
        Self {
            backend,
            loader,
            guardrails,
            candidate_name: config.candidate.name.clone(),
            fallback: config.responses.summary_fallback.clone(),
            chain: OnceCell::new(),
        }
    }

    /// Never fails; generation problems come back as the fallback summary
    /// with `error` set.
    pub async fn invoke(&self, style: SummaryStyle, ctx: &RequestContext) -> SummaryResponse {
        let started = Instant::now();
        info!(
            session = %ctx.session_id,
            style = style.as_str(),
            "Starting summary generation"
        );

        match self.generate(style).await {
            Ok(summary) => {
                info!(
                    chars = summary.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Summary generated successfully"
                );
                SummaryResponse {
                    summary,
                    style,
                    timestamp: Utc::now(),
                    error: None,
                }
            }
            Err(e) => {
                error!("Summary generation failed: {e}");
                SummaryResponse {
                    summary: self.fallback.clone(),
                    style,
                    timestamp: Utc::now(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn chain(&self) -> Result<Arc<SummaryChain>, GenerationFailure> {
        self.chain
            .get_or_try_init(|| async {
                info!("Initializing summary generation chain");
                let model = self.backend.language_model()?;
                Ok::<_, GenerationFailure>(Arc::new(SummaryChain {
                    model,
                    template: with_candidate(SUMMARY_TEMPLATE, &self.candidate_name),
                }))
            })
            .await
            .cloned()
    }

    async fn generate(&self, style: SummaryStyle) -> Result<String, GenerationFailure> {
        let chain = self.chain().await?;

        let documents = self.loader.load_all().await;
        if documents.is_empty() {
            return Err(GenerationFailure::NoDocuments);
        }
        let context = join_context(documents.iter().map(|doc| doc.content.as_str()));
        let prompt = with_context(
            &chain
                .template
                .replace("{style_instruction}", summary_style_instruction(style)),
            &context,
        );

        let messages = [
            ChatMessage::system(format!("{GROUNDING_INSTRUCTION}\n{PROFESSIONAL_TONE}")),
            ChatMessage::user(prompt),
        ];
        let raw = chain.model.complete(&messages).await?;
        info!(documents = documents.len(), "Summary model call completed");
        Ok(self
            .guardrails
            .validate_output(&raw, ReadingBudget::Report)
            .await)
    }
}
