//! Shared fixtures for pipeline and route tests.

use std::sync::Arc;

use tempfile::TempDir;

use super::{Pipelines, RequestContext};
use crate::config::Config;
use crate::guardrails::KeywordClassifier;
use crate::llm_client::fake::{FakeBackend, FakeEmbedder, FakeModel};

pub const CANDIDATE: &str = "Ada Lovelace";

const CV: &str = "\
# Ada Lovelace

## Experience
Staff Engineer, Acme Payments (2019-2024). Led the ledger rewrite project and a \
team of eight engineers. Designed Rust services processing two million \
transactions per day.

Senior Engineer, Initech (2015-2019). Built Python data pipelines and led the \
migration to Kubernetes.

## Skills
Rust, Python, PostgreSQL, Kubernetes, distributed systems, technical leadership.";

const ABOUT_ME: &str = "\
Ada enjoys mentoring junior engineers and speaking at meetups about reliable \
systems. Outside work she sails and restores old synthesizers.";

pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
    pub backend: Arc<FakeBackend>,
    pub pipelines: Arc<Pipelines>,
}

pub fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data.cv_path = dir.path().join("cv.md");
    config.data.about_me_path = dir.path().join("about_me.md");
    config.data.index_dir = dir.path().join("vector_db");
    config.data.analytics_log_path = dir.path().join("analytics.log");
    config.candidate.name = CANDIDATE.to_string();
    config.embedding.chunk_size = 200;
    config.embedding.chunk_overlap = 40;
    config.retrieval.k = 4;
    config.security.secure_cookies = false;
    config
}

pub fn write_documents(dir: &TempDir) {
    std::fs::write(dir.path().join("cv.md"), CV).unwrap();
    std::fs::write(dir.path().join("about_me.md"), ABOUT_ME).unwrap();
}

pub fn fixture(model: FakeModel) -> Fixture {
    fixture_with(FakeBackend::new(model), true)
}

pub fn fixture_with(backend: FakeBackend, with_documents: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    if with_documents {
        write_documents(&dir);
    }
    let config = config_in(&dir);
    let backend = Arc::new(backend);
    let pipelines = Arc::new(Pipelines::new(
        &config,
        backend.clone(),
        Arc::new(KeywordClassifier),
    ));
    Fixture {
        dir,
        config,
        backend,
        pipelines,
    }
}

pub fn failing_embedder_backend(model: FakeModel) -> FakeBackend {
    FakeBackend::with_embedder(model, FakeEmbedder::failing())
}

pub fn ctx(session_id: &str) -> RequestContext {
    RequestContext {
        user_code: "DEMO-ACME-1234".to_string(),
        company: "Acme".to_string(),
        session_id: session_id.to_string(),
    }
}

/// A job posting of roughly two hundred words mentioning "requirements".
pub fn job_description() -> String {
    let body = "We are hiring a Staff Backend Engineer to join our payments platform team. \
        You will design and operate Rust services that move money reliably across regions, \
        mentor engineers, and partner with product on the roadmap. Requirements: seven or \
        more years of professional software experience, deep knowledge of Rust or another \
        systems language, hands-on experience with PostgreSQL and Kubernetes, and a track \
        record of leading technical projects end to end. Nice to have: Python data \
        pipelines, ledger or accounting systems, and public speaking. Responsibilities \
        include owning service reliability, reviewing designs, running incident reviews, \
        improving observability, and growing the team through hiring and mentoring. We \
        offer a remote-friendly culture, a learning budget, and meaningful equity. Our \
        stack is Rust, PostgreSQL, Kafka and Kubernetes on a major cloud provider. You \
        will report to the Director of Engineering and work closely with finance, risk \
        and compliance partners. The interview process has four stages: an intro call, a \
        systems design session, a code review exercise, and a values conversation with \
        the leadership group. We value clear writing, ownership, curiosity and kindness. \
        Salary bands are published internally and reviewed twice a year. Please include \
        links to open source work if you have any.";
    body.to_string()
}
