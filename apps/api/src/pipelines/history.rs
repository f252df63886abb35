//! Per-session conversation history.
//!
//! One bounded turn list per session, each behind its own lock. Locks are
//! held only to snapshot or append, never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::llm_client::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Human,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        match self.role {
            TurnRole::Human => ChatMessage::user(self.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

type Turns = Arc<Mutex<Vec<Turn>>>;

pub struct HistoryStore {
    sessions: Mutex<HashMap<String, Turns>>,
    max_turns: usize,
}

// A poisoned lock only means another request panicked mid-append; the turn
// list itself is still valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HistoryStore {
    /// `max_turns == 0` keeps everything.
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns,
        }
    }

    fn session(&self, session_id: &str) -> Turns {
        lock(&self.sessions)
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the history as it was before `turn`, then appends `turn`.
    pub fn snapshot_and_push(&self, session_id: &str, turn: Turn) -> Vec<Turn> {
        let turns = self.session(session_id);
        let mut guard = lock(&turns);
        let snapshot = guard.clone();
        guard.push(turn);
        self.trim(&mut guard);
        snapshot
    }

    pub fn push(&self, session_id: &str, turn: Turn) {
        let turns = self.session(session_id);
        let mut guard = lock(&turns);
        guard.push(turn);
        self.trim(&mut guard);
    }

    pub fn snapshot(&self, session_id: &str) -> Vec<Turn> {
        let sessions = lock(&self.sessions);
        match sessions.get(session_id) {
            Some(turns) => lock(turns).clone(),
            None => Vec::new(),
        }
    }

    pub fn clear(&self, session_id: &str) {
        lock(&self.sessions).remove(session_id);
    }

    /// Drops the oldest turns in pairs so the list keeps starting with a
    /// human turn.
    fn trim(&self, turns: &mut Vec<Turn>) {
        if self.max_turns == 0 || turns.len() <= self.max_turns {
            return;
        }
        let mut excess = turns.len() - self.max_turns;
        if excess % 2 == 1 {
            excess += 1;
        }
        turns.drain(..excess.min(turns.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_excludes_pushed_turn() {
        let store = HistoryStore::new(0);
        assert!(store.snapshot_and_push("s1", Turn::human("hi")).is_empty());
        let snapshot = store.snapshot_and_push("s1", Turn::human("again"));
        assert_eq!(snapshot, vec![Turn::human("hi")]);
        assert_eq!(store.snapshot("s1").len(), 2);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = HistoryStore::new(0);
        store.push("a", Turn::human("from a"));
        store.push("b", Turn::human("from b"));
        assert_eq!(store.snapshot("a"), vec![Turn::human("from a")]);
        assert_eq!(store.snapshot("b"), vec![Turn::human("from b")]);
        assert!(store.snapshot("c").is_empty());
    }

    #[test]
    fn test_clear_removes_session() {
        let store = HistoryStore::new(0);
        store.push("a", Turn::human("q"));
        store.clear("a");
        assert!(store.snapshot("a").is_empty());
    }

    #[test]
    fn test_bounded_window_drops_oldest_pairs() {
        let store = HistoryStore::new(4);
        for i in 0..5 {
            store.push("s", Turn::human(format!("q{i}")));
            store.push("s", Turn::assistant(format!("a{i}")));
        }
        let turns = store.snapshot("s");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], Turn::human("q3"));
        assert_eq!(turns[3], Turn::assistant("a4"));
    }

    #[test]
    fn test_odd_overflow_keeps_human_first() {
        let store = HistoryStore::new(3);
        store.push("s", Turn::human("q0"));
        store.push("s", Turn::assistant("a0"));
        store.push("s", Turn::human("q1"));
        store.push("s", Turn::assistant("a1"));
        let turns = store.snapshot("s");
        assert_eq!(turns, vec![Turn::human("q1"), Turn::assistant("a1")]);
    }

    #[test]
    fn test_turns_map_to_chat_roles() {
        use crate::llm_client::Role;
        assert_eq!(Turn::human("x").to_message().role, Role::User);
        assert_eq!(Turn::assistant("x").to_message().role, Role::Assistant);
    }
}
