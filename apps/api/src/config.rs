use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Application configuration loaded from environment variables.
/// Every field has a default; `from_env` overlays whatever is set.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub rust_log: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub security: SecurityConfig,
    pub guardrails: GuardrailConfig,
    pub data: DataPaths,
    pub candidate: CandidateConfig,
    pub responses: ResponseConfig,
    pub max_history_turns: usize,
    pub analytics_enabled: bool,
    /// Invite code -> holder. Empty map disables authentication.
    pub invite_codes: HashMap<String, InviteCode>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub min_query_length: usize,
    pub max_query_length: usize,
    pub min_job_text_length: usize,
    pub max_job_text_length: usize,
    pub session_timeout_hours: u64,
    pub secure_cookies: bool,
}

/// Which content classifier backs the validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Hosted moderation endpoint; needs an OpenAI key.
    Moderation,
    /// Local keyword denylist.
    Keyword,
}

impl FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "moderation" | "openai" => Ok(Self::Moderation),
            "keyword" | "basic" => Ok(Self::Keyword),
            other => anyhow::bail!("unknown content classifier '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub classifier: ClassifierKind,
    pub input_toxicity_threshold: f32,
    pub output_toxicity_threshold: f32,
    /// Reading-time budget for chat answers, in minutes.
    pub chat_reading_minutes: f32,
    /// Reading-time budget for summaries and job-match reports, in minutes.
    pub report_reading_minutes: f32,
    pub irrelevant_topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub cv_path: PathBuf,
    pub about_me_path: PathBuf,
    pub index_dir: PathBuf,
    pub analytics_log_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CandidateConfig {
    pub name: String,
    pub email: String,
    pub linkedin: String,
    pub github: String,
}

/// Fixed strings returned in place of generated text.
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    /// Returned when chat generation fails. `{candidate_name}` is substituted.
    pub chat_fallback: String,
    /// Returned when generated output fails the safety gate.
    pub output_fallback: String,
    pub summary_fallback: String,
    pub job_match_fallback: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InviteCode {
    pub company: String,
    #[serde(default)]
    pub recruiter: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: "development".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            llm: LlmConfig {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.1,
                timeout_secs: 60,
            },
            ollama: OllamaConfig {
                endpoint: "http://localhost:11434".to_string(),
                timeout_secs: 120,
            },
            embedding: EmbeddingConfig {
                provider: "openai".to_string(),
                model: "text-embedding-3-small".to_string(),
                chunk_size: 1000,
                chunk_overlap: 200,
                batch_size: 64,
            },
            retrieval: RetrievalConfig { k: 8 },
            security: SecurityConfig {
                min_query_length: 3,
                max_query_length: 1000,
                min_job_text_length: 50,
                max_job_text_length: 5000,
                session_timeout_hours: 24,
                secure_cookies: true,
            },
            guardrails: GuardrailConfig {
                classifier: ClassifierKind::Keyword,
                input_toxicity_threshold: 0.5,
                output_toxicity_threshold: 0.3,
                chat_reading_minutes: 0.5,
                report_reading_minutes: 5.0,
                irrelevant_topics: ["weather", "sports", "cooking", "movies", "games"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            data: DataPaths {
                cv_path: PathBuf::from("data/cv.pdf"),
                about_me_path: PathBuf::from("data/about_me.md"),
                index_dir: PathBuf::from("data/vector_db"),
                analytics_log_path: PathBuf::from("data/analytics.log"),
            },
            candidate: CandidateConfig {
                name: "the candidate".to_string(),
                email: String::new(),
                linkedin: String::new(),
                github: String::new(),
            },
            responses: ResponseConfig {
                chat_fallback: "I'm having trouble answering right now. Please try again in a \
                    moment, or reach out to {candidate_name} directly."
                    .to_string(),
                output_fallback: "I'm sorry, but I cannot provide a response to that query."
                    .to_string(),
                summary_fallback: "Unable to generate summary. Please try again.".to_string(),
                job_match_fallback: "Unable to complete job matching analysis. Please try again."
                    .to_string(),
            },
            max_history_turns: 40,
            analytics_enabled: true,
            invite_codes: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let mut config = Config::default();

        config.environment = env_or("ENVIRONMENT", config.environment)?;
        config.port = env_or("PORT", config.port).context("PORT must be a valid port number")?;
        config.rust_log = env_or("RUST_LOG", config.rust_log)?;
        config.openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        config.openai_base_url = env_or("OPENAI_BASE_URL", config.openai_base_url)?;

        config.llm.provider = env_or("LLM_PROVIDER", config.llm.provider)?;
        config.llm.model = env_or("LLM_MODEL", config.llm.model)?;
        config.llm.temperature = env_or("LLM_TEMPERATURE", config.llm.temperature)?;
        config.llm.timeout_secs = env_or("LLM_TIMEOUT_SECS", config.llm.timeout_secs)?;
        config.ollama.endpoint = env_or("OLLAMA_ENDPOINT", config.ollama.endpoint)?;
        config.ollama.timeout_secs = env_or("OLLAMA_TIMEOUT_SECS", config.ollama.timeout_secs)?;

        config.embedding.provider = env_or("EMBEDDING_PROVIDER", config.embedding.provider)?;
        config.embedding.model = env_or("EMBEDDING_MODEL", config.embedding.model)?;
        config.embedding.chunk_size = env_or("CHUNK_SIZE", config.embedding.chunk_size)?;
        config.embedding.chunk_overlap = env_or("CHUNK_OVERLAP", config.embedding.chunk_overlap)?;
        config.embedding.batch_size = env_or("EMBEDDING_BATCH_SIZE", config.embedding.batch_size)?;
        anyhow::ensure!(
            config.embedding.chunk_overlap < config.embedding.chunk_size,
            "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
            config.embedding.chunk_overlap,
            config.embedding.chunk_size
        );

        config.retrieval.k = env_or("RETRIEVAL_K", config.retrieval.k)?;

        let security = &mut config.security;
        security.min_query_length = env_or("MIN_QUERY_LENGTH", security.min_query_length)?;
        security.max_query_length = env_or("MAX_QUERY_LENGTH", security.max_query_length)?;
        security.min_job_text_length = env_or("MIN_JOB_TEXT_LENGTH", security.min_job_text_length)?;
        security.max_job_text_length = env_or("MAX_JOB_TEXT_LENGTH", security.max_job_text_length)?;
        security.session_timeout_hours =
            env_or("SESSION_TIMEOUT_HOURS", security.session_timeout_hours)?;
        security.secure_cookies = env_or("SECURE_COOKIES", security.secure_cookies)?;

        let guardrails = &mut config.guardrails;
        guardrails.classifier = env_or("CONTENT_CLASSIFIER", guardrails.classifier)?;
        guardrails.input_toxicity_threshold =
            env_or("INPUT_TOXICITY_THRESHOLD", guardrails.input_toxicity_threshold)?;
        guardrails.output_toxicity_threshold =
            env_or("OUTPUT_TOXICITY_THRESHOLD", guardrails.output_toxicity_threshold)?;
        guardrails.chat_reading_minutes =
            env_or("CHAT_READING_MINUTES", guardrails.chat_reading_minutes)?;
        guardrails.report_reading_minutes =
            env_or("REPORT_READING_MINUTES", guardrails.report_reading_minutes)?;

        config.data.cv_path = env_or("CV_PATH", config.data.cv_path)?;
        config.data.about_me_path = env_or("ABOUT_ME_PATH", config.data.about_me_path)?;
        config.data.index_dir = env_or("INDEX_DIR", config.data.index_dir)?;
        config.data.analytics_log_path =
            env_or("ANALYTICS_LOG_PATH", config.data.analytics_log_path)?;

        config.candidate.name = env_or("CANDIDATE_NAME", config.candidate.name)?;
        config.candidate.email = env_or("CANDIDATE_EMAIL", config.candidate.email)?;
        config.candidate.linkedin = env_or("CANDIDATE_LINKEDIN", config.candidate.linkedin)?;
        config.candidate.github = env_or("CANDIDATE_GITHUB", config.candidate.github)?;

        config.responses.chat_fallback =
            env_or("CHAT_FALLBACK_RESPONSE", config.responses.chat_fallback)?;
        config.responses.output_fallback =
            env_or("OUTPUT_FALLBACK_RESPONSE", config.responses.output_fallback)?;

        config.max_history_turns = env_or("MAX_HISTORY_TURNS", config.max_history_turns)?;
        config.analytics_enabled = env_or("ANALYTICS_ENABLED", config.analytics_enabled)?;

        if let Ok(raw) = std::env::var("INVITE_CODES") {
            config.invite_codes =
                parse_invite_codes(&raw).context("INVITE_CODES must be a JSON object")?;
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }
}

/// Parses `{"CODE": {"company": "...", "active": true}}`.
pub fn parse_invite_codes(raw: &str) -> Result<HashMap<String, InviteCode>> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for '{key}': {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.security.min_query_length, 3);
        assert_eq!(config.security.max_query_length, 1000);
        assert_eq!(config.security.min_job_text_length, 50);
        assert_eq!(config.security.max_job_text_length, 5000);
        assert_eq!(config.embedding.chunk_size, 1000);
        assert_eq!(config.embedding.chunk_overlap, 200);
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.llm.timeout_secs, 60);
        assert!(config.ollama.timeout_secs > config.llm.timeout_secs);
    }

    #[test]
    fn test_parse_invite_codes() {
        let codes = parse_invite_codes(
            r#"{"DEMO-ACME-1234": {"company": "Acme", "active": true},
                "OLD-CODE": {"company": "Initech", "recruiter": "Bill", "active": false}}"#,
        )
        .unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes["DEMO-ACME-1234"].company, "Acme");
        assert!(codes["DEMO-ACME-1234"].active);
        assert_eq!(codes["OLD-CODE"].recruiter.as_deref(), Some("Bill"));
        assert!(!codes["OLD-CODE"].active);
    }

    #[test]
    fn test_invite_code_active_defaults_to_true() {
        let codes = parse_invite_codes(r#"{"X": {"company": "Globex"}}"#).unwrap();
        assert!(codes["X"].active);
    }

    #[test]
    fn test_parse_invite_codes_rejects_garbage() {
        assert!(parse_invite_codes("not json").is_err());
        assert!(parse_invite_codes("  ").unwrap().is_empty());
    }

    #[test]
    fn test_classifier_kind_from_str() {
        assert_eq!("moderation".parse::<ClassifierKind>().unwrap(), ClassifierKind::Moderation);
        assert_eq!(" Keyword ".parse::<ClassifierKind>().unwrap(), ClassifierKind::Keyword);
        assert!("neural".parse::<ClassifierKind>().is_err());
    }
}
