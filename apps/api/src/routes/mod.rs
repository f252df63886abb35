pub mod assistant;
pub mod auth;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let assistant = Router::new()
        .route("/chat", post(assistant::handle_chat))
        .route("/summary", post(assistant::handle_summary))
        .route("/job-match", post(assistant::handle_job_match))
        .route("/analytics/summary", get(assistant::handle_analytics_summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::anonymous_session,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route("/auth/login", post(auth::handle_login))
        .route("/auth/logout", post(auth::handle_logout))
        .route("/auth/status", get(auth::handle_status))
        .merge(assistant)
        .with_state(state)
}
