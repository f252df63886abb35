//! Invite-code sessions.
//!
//! A valid invite code is exchanged for an opaque token stored in the
//! `session_token` cookie. The token never leaves this module in logs; the
//! rest of the service keys history and analytics by `Session::id`.
//!
//! With no invite codes configured, each client still gets its own
//! anonymous session through the same cookie, so conversations never mix.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::InviteCode;
use crate::errors::AppError;
use crate::pipelines::{RequestContext, ANONYMOUS};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub user_code: String,
    pub company: String,
    pub recruiter: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn context(&self) -> RequestContext {
        RequestContext {
            user_code: self.user_code.clone(),
            company: self.company.clone(),
            session_id: self.id.clone(),
        }
    }
}

/// What `/auth/status` reports about a caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    pub user_code: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recruiter: Option<String>,
    pub login_time: DateTime<Utc>,
}

pub struct SessionStore {
    codes: HashMap<String, InviteCode>,
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(codes: HashMap<String, InviteCode>, timeout_hours: u64) -> Self {
        // Capped at a century; chrono panics on out-of-range durations.
        let hours = timeout_hours.min(876_000) as i64;
        Self {
            codes,
            sessions: RwLock::new(HashMap::new()),
            timeout: Duration::hours(hours),
        }
    }

    /// No invite codes configured means everyone is let in anonymously.
    pub fn is_enabled(&self) -> bool {
        !self.codes.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Exchanges an active invite code for a fresh session.
    pub fn login(&self, code: &str) -> Option<Session> {
        let code = code.trim();
        let Some(invite) = self.codes.get(code) else {
            warn!("Login attempt with unknown invite code");
            return None;
        };
        if !invite.active {
            warn!(company = %invite.company, "Login attempt with inactive invite code");
            return None;
        }

        let session = self.insert(code, &invite.company, invite.recruiter.clone());
        info!(company = %session.company, session = %session.id, "Session created");
        Some(session)
    }

    /// Opens a session for a caller when authentication is disabled.
    pub fn start_anonymous(&self) -> Session {
        let session = self.insert(ANONYMOUS, ANONYMOUS, None);
        debug!(session = %session.id, "Anonymous session created");
        session
    }

    fn insert(&self, user_code: &str, company: &str, recruiter: Option<String>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            user_code: user_code.to_string(),
            company: company.to_string(),
            recruiter,
            created_at: Utc::now(),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.token.clone(), session.clone());
        session
    }

    /// Looks up a live session. Expired entries stay until `take_expired` or
    /// `purge_expired` hands them to the caller for cleanup.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .filter(|session| !self.is_expired(session, Utc::now()))
            .cloned()
    }

    /// Removes and returns the session behind `token` if it has expired.
    pub fn take_expired(&self, token: &str) -> Option<Session> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !sessions
            .get(token)
            .is_some_and(|session| self.is_expired(session, Utc::now()))
        {
            return None;
        }
        let session = sessions.remove(token)?;
        debug!(session = %session.id, "Session expired");
        Some(session)
    }

    pub fn logout(&self, token: &str) -> Option<Session> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        if let Some(session) = &removed {
            info!(company = %session.company, session = %session.id, "Session ended");
        }
        removed
    }

    pub fn user_info(&self, token: &str) -> Option<UserInfo> {
        self.resolve(token).map(|s| UserInfo {
            user_code: s.user_code,
            company: s.company,
            recruiter: s.recruiter,
            login_time: s.created_at,
        })
    }

    /// Drops every expired session and returns them.
    pub fn purge_expired(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| self.is_expired(session, now))
            .map(|(token, _)| token.clone())
            .collect();
        expired
            .iter()
            .filter_map(|token| sessions.remove(token))
            .collect()
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.created_at >= self.timeout
    }
}

/// Extracts the caller. Rejects with 401 when auth is enabled and no live
/// session matches the cookie. With auth disabled the session comes from
/// `anonymous_session`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub ctx: RequestContext,
    pub token: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.sessions.is_enabled() {
            return Ok(match parts.extensions.get::<Session>() {
                Some(session) => AuthUser {
                    ctx: session.context(),
                    token: Some(session.token.clone()),
                },
                None => AuthUser {
                    ctx: RequestContext::anonymous(),
                    token: None,
                },
            });
        }

        let session = session_token(&parts.headers)
            .and_then(|token| state.resolve_session(&token))
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        Ok(AuthUser {
            ctx: session.context(),
            token: Some(session.token),
        })
    }
}

/// Middleware that gives every caller its own session when authentication
/// is disabled. New sessions get their cookie on the way out.
pub async fn anonymous_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.sessions.is_enabled() {
        return next.run(request).await;
    }

    if let Some(session) = session_token(request.headers()).and_then(|t| state.resolve_session(&t)) {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }

    let session = state.sessions.start_anonymous();
    let secure = state.config.security.secure_cookies && !is_local_host(request.headers());
    let cookie = session_cookie(&session.token, state.sessions.timeout(), secure);
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Failed to encode session cookie: {e}"),
    }
    response
}

/// Reads the session token out of the `Cookie` header, if present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Localhost never gets `Secure`, so plain-http development keeps working.
pub fn is_local_host(headers: &HeaderMap) -> bool {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| {
            let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
            matches!(name, "localhost" | "127.0.0.1" | "[::1]")
        })
        .unwrap_or(false)
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
