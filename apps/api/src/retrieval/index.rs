use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::IndexError;
use crate::documents::Document;

/// File name of the persisted index inside the index directory.
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Document,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub document: Document,
    pub score: f32,
}

/// Brute-force cosine index over embedded chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub embedding_model: String,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>, entries: Vec<IndexEntry>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-`k` chunks by cosine similarity, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                document: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    pub async fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = Self::path_in(dir);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| IndexError::Io { path, source })?;
        tokio::task::spawn_blocking(move || serde_json::from_slice::<Self>(&bytes))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
            .map_err(IndexError::from)
    }

    /// Writes to a temp file in `dir` and renames it over the index file, so
    /// readers never see a half-written index.
    pub async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let bytes = serde_json::to_vec(self)?;
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &bytes))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
    }
}

fn write_atomically(dir: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let io_err = |source: std::io::Error| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(VectorIndex::path_in(dir))
        .map_err(|e| io_err(e.error))?;
    Ok(())
}

/// 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
