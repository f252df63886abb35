use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Service status plus which model stack and classifier are configured.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "environment": state.config.environment,
        "llm_provider": state.config.llm.provider,
        "classifier": state.pipelines.guardrails.classifier_name(),
        "auth_enabled": state.sessions.is_enabled(),
    }))
}
