//! The fixed document set (CV and biography) plus job-text ingestion.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::DataPaths;
use crate::guardrails::{Guardrails, ValidationError};

pub mod chunker;

pub use chunker::TextSplitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Cv,
    AboutMe,
    TextInput,
    JobDescription,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Cv => "cv",
            DocumentSource::AboutMe => "about_me",
            DocumentSource::TextInput => "text_input",
            DocumentSource::JobDescription => "job_description",
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: DocumentSource,
    #[serde(rename = "type")]
    pub doc_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(
        content: impl Into<String>,
        source: DocumentSource,
        doc_type: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source,
                doc_type: doc_type.into(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("document {0} is empty or unreadable")]
    Empty(PathBuf),

    #[error("chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidChunking {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("document loading task failed: {0}")]
    Task(String),
}

/// Loads the candidate's documents from disk. Every call reads fresh.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    cv_path: PathBuf,
    about_me_path: PathBuf,
}

impl DocumentLoader {
    pub fn new(paths: &DataPaths) -> Self {
        Self {
            cv_path: paths.cv_path.clone(),
            about_me_path: paths.about_me_path.clone(),
        }
    }

    pub async fn load_cv(&self) -> Result<Document, DocumentError> {
        let content = read_blocking(self.cv_path.clone()).await?;
        info!(
            path = %self.cv_path.display(),
            chars = content.len(),
            "Loaded CV"
        );
        Ok(Document::new(content, DocumentSource::Cv, "cv"))
    }

    /// `Ok(None)` when the biography file does not exist.
    pub async fn load_about_me(&self) -> Result<Option<Document>, DocumentError> {
        if !tokio::fs::try_exists(&self.about_me_path)
            .await
            .unwrap_or(false)
        {
            warn!(
                "About Me document not found at path: {}",
                self.about_me_path.display()
            );
            return Ok(None);
        }
        let content = read_blocking(self.about_me_path.clone()).await?;
        info!(chars = content.len(), "Loaded About Me document");
        Ok(Some(Document::new(content, DocumentSource::AboutMe, "about_me")))
    }

    /// Each source fails independently and then contributes nothing.
    pub async fn load_all(&self) -> Vec<Document> {
        let mut documents = Vec::with_capacity(2);

        match self.load_cv().await {
            Ok(doc) => documents.push(doc),
            Err(e) => error!("Failed to load CV documents: {e}"),
        }
        match self.load_about_me().await {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => {}
            Err(e) => error!("Failed to load About Me documents: {e}"),
        }

        info!(count = documents.len(), "Loaded candidate documents");
        documents
    }
}

async fn read_blocking(path: PathBuf) -> Result<String, DocumentError> {
    tokio::task::spawn_blocking(move || read_source(&path))
        .await
        .map_err(|e| DocumentError::Task(e.to_string()))?
}

/// PDFs go through text extraction, everything else is read as UTF-8.
fn read_source(path: &Path) -> Result<String, DocumentError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let content = if is_pdf {
        pdf_extract::extract_text(path).map_err(|e| DocumentError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?
    };

    if content.trim().is_empty() {
        return Err(DocumentError::Empty(path.to_path_buf()));
    }
    Ok(content)
}

/// Turns pasted job-description text into a `Document`, enforcing the
/// job-text rules first.
pub fn process_job_text(text: &str, guardrails: &Guardrails) -> Result<Document, ValidationError> {
    guardrails.validate_job_text(text)?;

    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    info!(chars = cleaned.len(), "Processed job description text");
    Ok(Document::new(
        cleaned,
        DocumentSource::TextInput,
        "job_description",
    ))
}
