//! Interaction analytics.
//!
//! Each event becomes one line `PREFIX,{json}` appended to the analytics log
//! by a spawned task, so request handlers never wait on disk. Per-session
//! query counters live in memory.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pipelines::RequestContext;

const QUERY_LOG_CHARS: usize = 200;
const RESPONSE_LOG_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    Chat {
        query: String,
        response: String,
        query_length: usize,
        response_length: usize,
        response_time_ms: u64,
    },
    Summary {
        style: String,
        summary_length: usize,
    },
    JobMatch {
        job_source: String,
        analysis_length: usize,
        response_time_ms: u64,
    },
    Login {
        success: bool,
    },
    SessionEnd {
        query_count: usize,
        duration_secs: i64,
    },
}

impl Event {
    fn prefix(&self) -> &'static str {
        match self {
            Event::Chat { .. } => "CHAT",
            Event::Summary { .. } => "SUMMARY",
            Event::JobMatch { .. } => "JOB_MATCH",
            Event::Login { .. } => "LOGIN",
            Event::SessionEnd { .. } => "SESSION_END",
        }
    }
}

#[derive(Debug, Serialize)]
struct Record<'a> {
    timestamp: DateTime<Utc>,
    user_code: &'a str,
    company: &'a str,
    session_id: &'a str,
    #[serde(flatten)]
    event: Event,
}

#[derive(Debug, Clone)]
struct SessionStats {
    started_at: DateTime<Utc>,
    query_count: usize,
}

/// Aggregate view served by `GET /analytics/summary`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AnalyticsSummary {
    pub total_interactions: usize,
    pub chat_interactions: usize,
    pub summary_requests: usize,
    pub job_match_requests: usize,
    pub login_events: usize,
    pub unique_companies: usize,
    pub companies: Vec<String>,
    /// Chat queries made in the caller's current session.
    pub session_queries: usize,
}

pub struct Analytics {
    path: PathBuf,
    enabled: bool,
    sessions: Mutex<HashMap<String, SessionStats>>,
}

impl Analytics {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.data.analytics_log_path.clone(),
            enabled: config.analytics_enabled,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_session(&self, ctx: &RequestContext) {
        self.lock().insert(
            ctx.session_id.clone(),
            SessionStats {
                started_at: Utc::now(),
                query_count: 0,
            },
        );
        debug!(session = %ctx.session_id, company = %ctx.company, "Analytics session started");
    }

    /// Closes the session's counter and logs its totals.
    pub fn end_session(&self, ctx: &RequestContext) -> Option<JoinHandle<()>> {
        let stats = self.lock().remove(&ctx.session_id)?;
        let duration = Utc::now() - stats.started_at;
        info!(
            session = %ctx.session_id,
            queries = stats.query_count,
            duration_secs = duration.num_seconds(),
            "Analytics session ended"
        );
        self.emit(
            ctx,
            Event::SessionEnd {
                query_count: stats.query_count,
                duration_secs: duration.num_seconds(),
            },
        )
    }

    pub fn session_queries(&self, session_id: &str) -> usize {
        self.lock()
            .get(session_id)
            .map_or(0, |stats| stats.query_count)
    }

    pub fn record_chat(
        &self,
        ctx: &RequestContext,
        query: &str,
        response: &str,
        elapsed: Duration,
    ) -> Option<JoinHandle<()>> {
        self.lock()
            .entry(ctx.session_id.clone())
            .or_insert_with(|| SessionStats {
                started_at: Utc::now(),
                query_count: 0,
            })
            .query_count += 1;

        self.emit(
            ctx,
            Event::Chat {
                query: truncate(query, QUERY_LOG_CHARS),
                response: truncate(response, RESPONSE_LOG_CHARS),
                query_length: query.chars().count(),
                response_length: response.chars().count(),
                response_time_ms: elapsed.as_millis() as u64,
            },
        )
    }

    pub fn record_summary(
        &self,
        ctx: &RequestContext,
        style: &str,
        summary: &str,
    ) -> Option<JoinHandle<()>> {
        self.emit(
            ctx,
            Event::Summary {
                style: style.to_string(),
                summary_length: summary.chars().count(),
            },
        )
    }

    pub fn record_job_match(
        &self,
        ctx: &RequestContext,
        job_source: &str,
        analysis: &str,
        elapsed: Duration,
    ) -> Option<JoinHandle<()>> {
        self.emit(
            ctx,
            Event::JobMatch {
                job_source: job_source.to_string(),
                analysis_length: analysis.chars().count(),
                response_time_ms: elapsed.as_millis() as u64,
            },
        )
    }

    pub fn record_login(&self, ctx: &RequestContext, success: bool) -> Option<JoinHandle<()>> {
        self.emit(ctx, Event::Login { success })
    }

    /// Aggregates the log file. Malformed lines are skipped; a missing file
    /// reads as no activity.
    pub async fn summary(&self, session_id: &str) -> AnalyticsSummary {
        let mut summary = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => summarize(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AnalyticsSummary::default(),
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read analytics log: {e}");
                AnalyticsSummary::default()
            }
        };
        summary.session_queries = self.session_queries(session_id);
        summary
    }

    /// Spawns the append and hands back its handle; callers normally drop it.
    fn emit(&self, ctx: &RequestContext, event: Event) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let prefix = event.prefix();
        let record = Record {
            timestamp: Utc::now(),
            user_code: &ctx.user_code,
            company: &ctx.company,
            session_id: &ctx.session_id,
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(json) => format!("{prefix},{json}\n"),
            Err(e) => {
                warn!("Failed to serialize analytics record: {e}");
                return None;
            }
        };

        let path = self.path.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = append_line(&path, &line).await {
                warn!(path = %path.display(), "Analytics logging error: {e}");
            }
        }))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionStats>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    // tokio hands the write to the blocking pool; flush waits for it.
    file.flush().await
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn summarize(contents: &str) -> AnalyticsSummary {
    let mut summary = AnalyticsSummary::default();
    let mut companies = BTreeSet::new();

    for line in contents.lines() {
        let Some((prefix, json)) = line.split_once(',') else {
            continue;
        };
        let record: serde_json::Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed analytics line skipped: {e}");
                continue;
            }
        };

        match prefix {
            "CHAT" => summary.chat_interactions += 1,
            "SUMMARY" => summary.summary_requests += 1,
            "JOB_MATCH" => summary.job_match_requests += 1,
            "LOGIN" => summary.login_events += 1,
            _ => continue,
        }
        summary.total_interactions += 1;
        companies.insert(
            record
                .get("company")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown")
                .to_string(),
        );
    }

    summary.unique_companies = companies.len();
    summary.companies = companies.into_iter().collect();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics_in(dir: &tempfile::TempDir, enabled: bool) -> Analytics {
        let mut config = Config::default();
        config.data.analytics_log_path = dir.path().join("logs").join("analytics.log");
        config.analytics_enabled = enabled;
        Analytics::new(&config)
    }

    fn ctx(session: &str, company: &str) -> RequestContext {
        RequestContext {
            user_code: "DEMO-ACME-1234".to_string(),
            company: company.to_string(),
            session_id: session.to_string(),
        }
    }

    #[tokio::test]
    async fn test_chat_lines_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = analytics_in(&dir, true);
        let query = "q".repeat(300);
        let response = "r".repeat(900);

        analytics
            .record_chat(&ctx("s1", "Acme"), &query, &response, Duration::from_millis(12))
            .unwrap()
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("logs/analytics.log")).unwrap();
        let (prefix, json) = contents.trim_end().split_once(',').unwrap();
        assert_eq!(prefix, "CHAT");
        let record: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(record["type"], "chat");
        assert_eq!(record["company"], "Acme");
        assert_eq!(record["query"].as_str().unwrap().len(), 200);
        assert_eq!(record["response"].as_str().unwrap().len(), 500);
        assert_eq!(record["query_length"], 300);
        assert_eq!(record["response_time_ms"], 12);
    }

    #[tokio::test]
    async fn test_session_counters() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = analytics_in(&dir, false);
        let session = ctx("s1", "Acme");

        analytics.start_session(&session);
        assert_eq!(analytics.session_queries("s1"), 0);
        analytics.record_chat(&session, "a", "b", Duration::ZERO);
        analytics.record_chat(&session, "c", "d", Duration::ZERO);
        assert_eq!(analytics.session_queries("s1"), 2);
        assert_eq!(analytics.session_queries("s2"), 0);

        assert!(analytics.end_session(&session).is_none());
        assert_eq!(analytics.session_queries("s1"), 0);
    }

    #[tokio::test]
    async fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = analytics_in(&dir, false);
        assert!(analytics
            .record_login(&ctx("s1", "Acme"), true)
            .is_none());
        assert!(!dir.path().join("logs/analytics.log").exists());
    }

    #[tokio::test]
    async fn test_summary_aggregates_log() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = analytics_in(&dir, true);
        let acme = ctx("s1", "Acme");
        let initech = ctx("s2", "Initech");

        let handles = [
            analytics.record_login(&acme, true),
            analytics.record_chat(&acme, "q", "a", Duration::ZERO),
            analytics.record_summary(&initech, "bullet", "summary"),
            analytics.record_job_match(&initech, "text_input", "fit", Duration::ZERO),
        ];
        for handle in handles.into_iter().flatten() {
            handle.await.unwrap();
        }
        let path = dir.path().join("logs/analytics.log");
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("garbage line\nCHAT,{not json}\n");
        std::fs::write(&path, contents).unwrap();

        let summary = analytics.summary("s1").await;
        assert_eq!(summary.total_interactions, 4);
        assert_eq!(summary.chat_interactions, 1);
        assert_eq!(summary.summary_requests, 1);
        assert_eq!(summary.job_match_requests, 1);
        assert_eq!(summary.login_events, 1);
        assert_eq!(summary.companies, vec!["Acme", "Initech"]);
        assert_eq!(summary.session_queries, 1);
    }

    #[tokio::test]
    async fn test_missing_log_is_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let summary = analytics_in(&dir, true).summary("s1").await;
        assert_eq!(summary, AnalyticsSummary::default());
    }
}
