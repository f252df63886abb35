mod analytics;
mod auth;
mod config;
mod documents;
mod errors;
mod guardrails;
mod llm_client;
mod pipelines;
mod retrieval;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::guardrails::build_classifier;
use crate::llm_client::{ModelBackend, ModelProvider};
use crate::pipelines::Pipelines;
use crate::routes::build_router;
use crate::state::AppState;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Parser, Debug)]
#[command(version, about = "Résumé assistant API")]
struct Cli {
    /// Rebuild the vector index from the candidate documents and exit.
    #[arg(long)]
    ingest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting résumé assistant v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn ModelBackend> = Arc::new(ModelProvider::new(config.clone()));
    let classifier = build_classifier(&config);
    info!(classifier = classifier.name(), "Content classifier selected");
    let pipelines = Arc::new(Pipelines::new(&config, backend, classifier));

    if cli.ingest {
        let chunks = pipelines
            .index
            .rebuild()
            .await
            .context("index rebuild failed")?;
        info!(chunks, dir = %config.data.index_dir.display(), "Ingestion complete");
        return Ok(());
    }

    let state = AppState::new(config.clone(), pipelines);
    if state.sessions.is_enabled() {
        info!(codes = config.invite_codes.len(), "Invite-code authentication enabled");
    } else {
        info!("No invite codes configured; callers get anonymous sessions");
    }

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let retired = sweeper.sweep_expired_sessions();
            if retired > 0 {
                debug!(retired, "Expired sessions retired");
            }
        }
    });

    let cors = if config.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
