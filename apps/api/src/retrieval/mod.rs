//! Persistent similarity index over the candidate's document chunks.
//!
//! The index directory is in one of three states: absent, present but empty,
//! or populated. Only a populated index is loaded as-is; anything else, a
//! failed load included, triggers a full rebuild from the document source.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::{DocumentError, DocumentLoader, TextSplitter};
use crate::llm_client::{Embedder, LlmError, ModelBackend};

pub mod index;

pub use index::{IndexEntry, ScoredChunk, VectorIndex, INDEX_FILE};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("no documents available to index")]
    NoDocuments,

    #[error("index task failed: {0}")]
    Task(String),
}

/// Owns the shared index. The first `get_or_build` call checks the index
/// directory and loads or rebuilds; every later call gets the same `Arc`.
pub struct IndexManager {
    index_dir: PathBuf,
    loader: DocumentLoader,
    backend: Arc<dyn ModelBackend>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
    index: OnceCell<Arc<VectorIndex>>,
}

impl IndexManager {
    pub fn new(config: &Config, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            index_dir: config.data.index_dir.clone(),
            loader: DocumentLoader::new(&config.data),
            backend,
            chunk_size: config.embedding.chunk_size,
            chunk_overlap: config.embedding.chunk_overlap,
            batch_size: config.embedding.batch_size.max(1),
            index: OnceCell::new(),
        }
    }

    /// Concurrent first callers share a single load or build. A failed build
    /// leaves the cell empty so the next caller tries again.
    pub async fn get_or_build(&self) -> Result<Arc<VectorIndex>, IndexError> {
        self.index
            .get_or_try_init(|| self.load_or_build())
            .await
            .cloned()
    }

    async fn load_or_build(&self) -> Result<Arc<VectorIndex>, IndexError> {
        let embedder = self.backend.embedder()?;
        if let Some(index) = self.stored_index(embedder.model_name()).await {
            info!(
                chunks = index.len(),
                "Loaded existing vector index from {}",
                self.index_dir.display()
            );
            return Ok(Arc::new(index));
        }
        warn!(
            "Vector index not found or empty at {}. Initializing...",
            self.index_dir.display()
        );
        self.build_with(embedder.as_ref()).await.map(Arc::new)
    }

    /// Returns the persisted index only if it is usable with the configured
    /// embedder. Never fails.
    async fn stored_index(&self, embedding_model: &str) -> Option<VectorIndex> {
        let mut dir = match tokio::fs::read_dir(&self.index_dir).await {
            Ok(dir) => dir,
            Err(_) => return None,
        };
        if !matches!(dir.next_entry().await, Ok(Some(_))) {
            return None;
        }
        if !tokio::fs::try_exists(VectorIndex::path_in(&self.index_dir))
            .await
            .unwrap_or(false)
        {
            return None;
        }

        match VectorIndex::load(&self.index_dir).await {
            Ok(index) if index.is_empty() => {
                warn!("Vector index exists but contains no chunks");
                None
            }
            Ok(index) if index.embedding_model != embedding_model => {
                warn!(
                    stored = %index.embedding_model,
                    configured = %embedding_model,
                    "Vector index was built with a different embedding model"
                );
                None
            }
            Ok(index) => Some(index),
            Err(e) => {
                warn!("Error checking vector index population: {e}");
                None
            }
        }
    }

    /// Loads, chunks and embeds the document set, then persists it.
    pub async fn build(&self) -> Result<VectorIndex, IndexError> {
        let embedder = self.backend.embedder()?;
        self.build_with(embedder.as_ref()).await
    }

    async fn build_with(&self, embedder: &dyn Embedder) -> Result<VectorIndex, IndexError> {
        let started = Instant::now();
        let documents = self.loader.load_all().await;
        if documents.is_empty() {
            return Err(IndexError::NoDocuments);
        }

        let splitter = TextSplitter::new(self.chunk_size, self.chunk_overlap)?;
        let chunks = splitter.split_documents(&documents);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "Split documents into chunks"
        );

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embed_batch(embedder, &texts).await?;
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| IndexEntry { chunk, embedding }),
            );
        }

        let index = VectorIndex::new(embedder.model_name(), entries);
        index.persist(&self.index_dir).await?;
        info!(
            chunks = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vector index initialized"
        );
        Ok(index)
    }

    /// Unconditional rebuild used by the ingest command. Returns the chunk count.
    pub async fn rebuild(&self) -> Result<usize, IndexError> {
        Ok(self.build().await?.len())
    }
}

async fn embed_batch(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
    let vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(LlmError::EmbeddingCount {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    use crate::llm_client::fake::{FakeBackend, FakeModel};

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.data.cv_path = dir.join("cv.md");
        config.data.about_me_path = dir.join("about_me.md");
        config.data.index_dir = dir.join("vector_db");
        config.embedding.batch_size = 2;
        config
    }

    fn write_documents(dir: &Path) {
        std::fs::write(
            dir.join("cv.md"),
            "Led the payments platform team at Acme.\n\nBuilt Rust services.",
        )
        .unwrap();
        std::fs::write(dir.join("about_me.md"), "Enjoys sailing and mentoring.").unwrap();
    }

    fn manager(config: &Config) -> (IndexManager, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new(FakeModel::fixed("unused")));
        (IndexManager::new(config, backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_absent_directory_triggers_build() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        let (manager, backend) = manager(&config);

        let index = manager.get_or_build().await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(config.data.index_dir.join(INDEX_FILE).exists());
        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_empty_directory_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.data.index_dir).unwrap();
        let (manager, backend) = manager(&config);

        let index = manager.get_or_build().await.unwrap();
        assert!(!index.is_empty());
        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_or_corrupt_contents_are_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.data.index_dir).unwrap();
        std::fs::write(config.data.index_dir.join("stray.bin"), b"junk").unwrap();

        let (first, _) = manager(&config);
        assert_eq!(first.get_or_build().await.unwrap().len(), 2);

        std::fs::write(config.data.index_dir.join(INDEX_FILE), b"garbage").unwrap();
        let (second, backend) = manager(&config);
        assert_eq!(second.get_or_build().await.unwrap().len(), 2);
        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_entry_index_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        VectorIndex::new("fake-embedder", Vec::new())
            .persist(&config.data.index_dir)
            .await
            .unwrap();

        let (manager, _) = manager(&config);
        assert_eq!(manager.get_or_build().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_populated_index_is_loaded_without_embedding() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        let (builder, _) = manager(&config);
        builder.get_or_build().await.unwrap();

        let (loader, backend) = manager(&config);
        assert_eq!(loader.get_or_build().await.unwrap().len(), 2);
        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_from_other_embedding_model_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        let (builder, _) = manager(&config);
        builder.get_or_build().await.unwrap();

        let mut stale = VectorIndex::load(&config.data.index_dir).await.unwrap();
        stale.embedding_model = "text-embedding-3-large".to_string();
        for entry in &mut stale.entries {
            entry.embedding.truncate(8);
        }
        stale.persist(&config.data.index_dir).await.unwrap();

        let (manager, backend) = manager(&config);
        let index = manager.get_or_build().await.unwrap();
        assert_eq!(index.embedding_model, "fake-embedder");
        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 1);

        let persisted = VectorIndex::load(&config.data.index_dir).await.unwrap();
        assert_eq!(persisted.embedding_model, "fake-embedder");
        assert_eq!(persisted.entries[0].embedding.len(), index.entries[0].embedding.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_callers_build_once() {
        let dir = tempfile::tempdir().unwrap();
        write_documents(dir.path());
        let config = config_in(dir.path());
        let (manager, backend) = manager(&config);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_or_build().await.unwrap() })
            })
            .collect();
        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap());
        }

        assert_eq!(backend.embedder.calls.load(Ordering::SeqCst), 1);
        assert!(indexes.iter().all(|i| Arc::ptr_eq(i, &indexes[0])));
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (manager, _) = manager(&config);

        assert!(matches!(
            manager.get_or_build().await,
            Err(IndexError::NoDocuments)
        ));

        write_documents(dir.path());
        assert_eq!(manager.get_or_build().await.unwrap().len(), 2);
    }
}
