use std::sync::Arc;

use crate::analytics::Analytics;
use crate::auth::{Session, SessionStore};
use crate::config::Config;
use crate::pipelines::Pipelines;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Chat, summary and job-match pipelines; built lazily on first use.
    pub pipelines: Arc<Pipelines>,
    pub sessions: Arc<SessionStore>,
    pub analytics: Arc<Analytics>,
}

impl AppState {
    pub fn new(config: Config, pipelines: Arc<Pipelines>) -> Self {
        let sessions = SessionStore::new(
            config.invite_codes.clone(),
            config.security.session_timeout_hours,
        );
        let analytics = Analytics::new(&config);
        Self {
            config,
            pipelines,
            sessions: Arc::new(sessions),
            analytics: Arc::new(analytics),
        }
    }

    /// A live session for `token`. An expired one is retired on the way.
    pub fn resolve_session(&self, token: &str) -> Option<Session> {
        if let Some(session) = self.sessions.resolve(token) {
            return Some(session);
        }
        if let Some(expired) = self.sessions.take_expired(token) {
            self.end_session(&expired);
        }
        None
    }

    /// Drops everything keyed by the session: its history and its analytics counter.
    pub fn end_session(&self, session: &Session) {
        self.pipelines.chat.clear_history(&session.id);
        self.analytics.end_session(&session.context());
    }

    /// Retires every expired session and returns how many there were.
    pub fn sweep_expired_sessions(&self) -> usize {
        let expired = self.sessions.purge_expired();
        for session in &expired {
            self.end_session(session);
        }
        expired.len()
    }
}
