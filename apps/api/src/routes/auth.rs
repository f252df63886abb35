use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{expired_cookie, is_local_host, session_cookie, session_token, UserInfo};
use crate::errors::AppError;
use crate::pipelines::RequestContext;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub auth_enabled: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// POST /auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    // Anonymous callers keep the session cookie they already have.
    if !state.sessions.is_enabled() {
        return Ok(Json(AuthStatus {
            auth_enabled: false,
            authenticated: true,
            user: None,
        })
        .into_response());
    }

    let Some(session) = state.sessions.login(&req.invite_code) else {
        let unknown = RequestContext {
            user_code: "unknown".to_string(),
            company: "Unknown".to_string(),
            session_id: "none".to_string(),
        };
        state.analytics.record_login(&unknown, false);
        return Err(AppError::Unauthorized(
            "Invalid or inactive invite code".to_string(),
        ));
    };

    let ctx = session.context();
    state.analytics.start_session(&ctx);
    state.analytics.record_login(&ctx, true);

    let secure = state.config.security.secure_cookies && !is_local_host(&headers);
    let cookie = session_cookie(&session.token, state.sessions.timeout(), secure);
    let status = AuthStatus {
        auth_enabled: true,
        authenticated: true,
        user: Some(UserInfo {
            user_code: session.user_code,
            company: session.company,
            recruiter: session.recruiter,
            login_time: session.created_at,
        }),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(status)).into_response())
}

/// POST /auth/logout
/// Idempotent: clears whatever session the cookie names, if any.
pub async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(session) = session_token(&headers).and_then(|t| state.sessions.logout(&t)) {
        state.end_session(&session);
    }

    (
        [(header::SET_COOKIE, expired_cookie())],
        Json(AuthStatus {
            auth_enabled: state.sessions.is_enabled(),
            authenticated: false,
            user: None,
        }),
    )
}

/// GET /auth/status
pub async fn handle_status(State(state): State<AppState>, headers: HeaderMap) -> Json<AuthStatus> {
    if !state.sessions.is_enabled() {
        return Json(AuthStatus {
            auth_enabled: false,
            authenticated: true,
            user: None,
        });
    }

    let user = session_token(&headers).and_then(|t| state.sessions.user_info(&t));
    Json(AuthStatus {
        auth_enabled: true,
        authenticated: user.is_some(),
        user,
    })
}
