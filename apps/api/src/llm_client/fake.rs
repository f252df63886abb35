//! In-process fakes for the model traits. Test-only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatMessage, Embedder, LanguageModel, LlmError, ModelBackend};

type Responder = dyn Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync;

/// Language model answering through a closure and recording every prompt.
pub struct FakeModel {
    responder: Box<Responder>,
    delay: Duration,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same text.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fails with an API error.
    pub fn failing() -> Self {
        Self::new(|_| {
            Err(LlmError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(messages)
    }
}

/// Deterministic bag-of-words embedder: texts sharing words land close together.
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    fail: bool,
}

pub const FAKE_DIMENSIONS: usize = 64;

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; FAKE_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % FAKE_DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Timeout(Duration::from_secs(60)));
        }
        Ok(inputs.iter().map(|text| Self::vectorize(text)).collect())
    }
}

/// Backend handing out shared fakes and counting how often each is requested.
/// Every chain build asks for the language model exactly once, so
/// `model_builds` doubles as a build counter.
pub struct FakeBackend {
    pub model: Arc<FakeModel>,
    pub embedder: Arc<FakeEmbedder>,
    pub model_builds: AtomicUsize,
    pub embedder_builds: AtomicUsize,
}

impl FakeBackend {
    pub fn new(model: FakeModel) -> Self {
        Self::with_embedder(model, FakeEmbedder::new())
    }

    pub fn with_embedder(model: FakeModel, embedder: FakeEmbedder) -> Self {
        Self {
            model: Arc::new(model),
            embedder: Arc::new(embedder),
            model_builds: AtomicUsize::new(0),
            embedder_builds: AtomicUsize::new(0),
        }
    }

    pub fn model_builds(&self) -> usize {
        self.model_builds.load(Ordering::SeqCst)
    }
}

impl ModelBackend for FakeBackend {
    fn language_model(&self) -> Result<Arc<dyn LanguageModel>, LlmError> {
        self.model_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.model.clone())
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>, LlmError> {
        self.embedder_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.embedder.clone())
    }
}
