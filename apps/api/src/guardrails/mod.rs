//! Validation gate for everything entering and leaving the model.
//!
//! Input checks reject with a `ValidationError` the caller turns into a 400.
//! Output checks never fail: a rejected answer is replaced by the configured
//! fallback string.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;

pub mod classifier;

pub use classifier::{build_classifier, ContentClassifier, ContentVerdict, KeywordClassifier};

/// Average reading speed: milliseconds per character.
pub const READING_MS_PER_CHAR: f32 = 14.69;

const MSG_UNPROFESSIONAL: &str = "Please rephrase your question professionally";
const MSG_INJECTION: &str = "Invalid query format detected. Please rephrase your question";
const MSG_GENERIC: &str = "Unable to process this query. Please rephrase your question";
const MSG_OFF_TOPIC: &str =
    "Please ask questions related to professional qualifications and experience";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    TooShort,
    TooLong,
    OffTopic,
    UnsafeContent,
    MalformedMarkup,
    MissingRequiredSection,
}

/// A rejected input. `message` is safe to show to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Which reading-time budget an answer is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingBudget {
    Chat,
    Report,
}

/// Estimated reading time in minutes.
pub fn reading_minutes(text: &str) -> f32 {
    text.chars().count() as f32 * READING_MS_PER_CHAR / 60_000.0
}

/// Query and output validation, shared by every pipeline.
pub struct Guardrails {
    classifier: Arc<dyn ContentClassifier>,
    min_query_length: usize,
    max_query_length: usize,
    min_job_text_length: usize,
    max_job_text_length: usize,
    irrelevant_topics: Vec<String>,
    input_threshold: f32,
    output_threshold: f32,
    chat_reading_minutes: f32,
    report_reading_minutes: f32,
    output_fallback: String,
}

impl Guardrails {
    pub fn new(config: &Config, classifier: Arc<dyn ContentClassifier>) -> Self {
        Self {
            classifier,
            min_query_length: config.security.min_query_length,
            max_query_length: config.security.max_query_length,
            min_job_text_length: config.security.min_job_text_length,
            max_job_text_length: config.security.max_job_text_length,
            irrelevant_topics: config
                .guardrails
                .irrelevant_topics
                .iter()
                .map(|topic| topic.to_lowercase())
                .collect(),
            input_threshold: config.guardrails.input_toxicity_threshold,
            output_threshold: config.guardrails.output_toxicity_threshold,
            chat_reading_minutes: config.guardrails.chat_reading_minutes,
            report_reading_minutes: config.guardrails.report_reading_minutes,
            output_fallback: config.responses.output_fallback.clone(),
        }
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Checks a user query in order: length, topic, content. Returns the
    /// query unchanged on success.
    pub async fn validate_query(&self, query: &str) -> Result<String, ValidationError> {
        if query.trim().chars().count() < self.min_query_length {
            return Err(ValidationError::new(
                ValidationKind::TooShort,
                format!(
                    "Query must be at least {} characters long",
                    self.min_query_length
                ),
            ));
        }
        if query.chars().count() > self.max_query_length {
            return Err(ValidationError::new(
                ValidationKind::TooLong,
                format!(
                    "Query too long. Maximum {} characters allowed",
                    self.max_query_length
                ),
            ));
        }

        let lower = query.to_lowercase();
        if self
            .irrelevant_topics
            .iter()
            .any(|topic| lower.contains(topic.as_str()))
        {
            return Err(ValidationError::new(ValidationKind::OffTopic, MSG_OFF_TOPIC));
        }

        match self.classifier.classify(query).await {
            Ok(verdict) => {
                if verdict.injection {
                    return Err(ValidationError::new(
                        ValidationKind::UnsafeContent,
                        MSG_INJECTION,
                    ));
                }
                if verdict.profanity || verdict.toxicity >= self.input_threshold {
                    return Err(ValidationError::new(
                        ValidationKind::UnsafeContent,
                        MSG_UNPROFESSIONAL,
                    ));
                }
            }
            Err(e) => {
                warn!("Query classification failed: {e}");
                return Err(ValidationError::new(
                    ValidationKind::UnsafeContent,
                    MSG_GENERIC,
                ));
            }
        }

        Ok(query.to_string())
    }

    /// Checks pasted job-description text: length, markup, then that it
    /// actually reads like a job posting.
    pub fn validate_job_text(&self, text: &str) -> Result<(), ValidationError> {
        let length = text.trim().chars().count();
        if length < self.min_job_text_length {
            return Err(ValidationError::new(
                ValidationKind::TooShort,
                format!(
                    "Job description text must be at least {} characters long",
                    self.min_job_text_length
                ),
            ));
        }
        if length > self.max_job_text_length {
            return Err(ValidationError::new(
                ValidationKind::TooLong,
                format!(
                    "Job description text must not exceed {} characters",
                    self.max_job_text_length
                ),
            ));
        }

        if dangerous_tag_re().is_match(text) || event_handler_re().is_match(text) {
            return Err(ValidationError::new(
                ValidationKind::MalformedMarkup,
                "Job description contains potentially unsafe content",
            ));
        }

        if !english_job_re().is_match(text) && !german_job_re().is_match(text) {
            return Err(ValidationError::new(
                ValidationKind::MissingRequiredSection,
                "Text does not appear to be a job description",
            ));
        }

        Ok(())
    }

    /// Returns `text` if it passes every output check, the fallback otherwise.
    pub async fn validate_output(&self, text: &str, budget: ReadingBudget) -> String {
        match self.check_output(text, budget).await {
            Ok(()) => text.to_string(),
            Err(reason) => {
                warn!("Output rejected: {reason}");
                self.output_fallback.clone()
            }
        }
    }

    async fn check_output(&self, text: &str, budget: ReadingBudget) -> Result<(), String> {
        if text.trim().is_empty() {
            return Err("empty output".to_string());
        }

        let limit = match budget {
            ReadingBudget::Chat => self.chat_reading_minutes,
            ReadingBudget::Report => self.report_reading_minutes,
        };
        let minutes = reading_minutes(text);
        if minutes > limit {
            return Err(format!(
                "reading time {minutes:.2} min exceeds {limit:.2} min"
            ));
        }

        let verdict = self
            .classifier
            .classify(text)
            .await
            .map_err(|e| format!("classifier error: {e}"))?;
        if verdict.profanity || verdict.toxicity >= self.output_threshold {
            return Err(format!(
                "toxicity {:.2} (categories: {:?})",
                verdict.toxicity, verdict.categories
            ));
        }
        Ok(())
    }
}

fn dangerous_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)<\s*/?\s*(script|iframe|object|embed|form|img|svg|math|link|style|video|audio|base|meta|body|html|input|button)\b",
        )
        .expect("dangerous tag pattern is valid")
    })
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bon[a-z]+\s*=|javascript\s*:")
            .expect("event handler pattern is valid")
    })
}

fn english_job_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(job|position|role|responsibilities|skills|qualifications|experience|requirements)\b",
        )
        .expect("english keyword pattern is valid")
    })
}

fn german_job_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(arbeit|position|rolle|verantwortlichkeiten|fähigkeiten|qualifikationen|erfahrung|anforderungen)\b",
        )
        .expect("german keyword pattern is valid")
    })
}
