use std::time::Instant;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::analytics::AnalyticsSummary;
use crate::auth::AuthUser;
use crate::documents::process_job_text;
use crate::errors::AppError;
use crate::pipelines::{ChatResponse, JobMatchResponse, SummaryResponse, SummaryStyle};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Deserialize)]
pub struct SummaryParams {
    pub style: Option<String>,
}

#[derive(Deserialize)]
pub struct JobMatchRequest {
    pub text: String,
}

/// POST /chat
pub async fn handle_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let started = Instant::now();
    let response = state.pipelines.chat.invoke(&req.query, &user.ctx).await?;
    state
        .analytics
        .record_chat(&user.ctx, &req.query, &response.answer, started.elapsed());
    Ok(Json(response))
}

/// POST /summary?style=bullet|paragraph|executive
pub async fn handle_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SummaryParams>,
) -> Json<SummaryResponse> {
    let style = SummaryStyle::parse(params.style.as_deref());
    let response = state.pipelines.summary.invoke(style, &user.ctx).await;
    state
        .analytics
        .record_summary(&user.ctx, style.as_str(), &response.summary);
    Json(response)
}

/// POST /job-match
/// The text is validated on ingestion and again inside the pipeline.
pub async fn handle_job_match(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<JobMatchRequest>,
) -> Result<Json<JobMatchResponse>, AppError> {
    let started = Instant::now();
    let document = process_job_text(&req.text, &state.pipelines.guardrails)?;
    let response = state.pipelines.job_match.invoke(&document, &user.ctx).await?;
    state.analytics.record_job_match(
        &user.ctx,
        document.metadata.source.as_str(),
        &response.analysis,
        started.elapsed(),
    );
    Ok(Json(response))
}

/// GET /analytics/summary
pub async fn handle_analytics_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<AnalyticsSummary> {
    Json(state.analytics.summary(&user.ctx.session_id).await)
}
