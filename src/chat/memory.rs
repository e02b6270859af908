//! Conversation Memory
//!
//! Session-keyed, append-only transcript store. Memory exclusively owns all
//! turn data; the orchestrator and transport layer go through this store and
//! never mutate turns directly. Sessions are created lazily on first message
//! and live until an explicit reset or a capacity eviction.

use super::types::{Role, Turn};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================
// SESSION ENTRY
// ============================================================

/// Per-session state: the transcript plus the lock that serializes whole
/// turns for this session.
pub struct SessionEntry {
    /// Held by the orchestrator for the duration of one message so that
    /// concurrent messages to the same session cannot interleave history.
    /// Other sessions proceed independently.
    pub turn_lock: tokio::sync::Mutex<()>,
    turns: Mutex<Vec<Turn>>,
    last_active: Mutex<DateTime<Utc>>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            turn_lock: tokio::sync::Mutex::new(()),
            turns: Mutex::new(Vec::new()),
            last_active: Mutex::new(Utc::now()),
        }
    }

    /// Exclusive append; prior turns are never overwritten
    pub fn append(&self, role: Role, content: &str) {
        let mut turns = self.turns.lock().unwrap();
        turns.push(Turn::new(role, content));
        *self.last_active.lock().unwrap() = Utc::now();
    }

    pub fn history(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }

    /// The most recent `max_turns` turns, oldest first. The caller appends
    /// the incoming user turn before computing the window, so the window can
    /// see the latest user message if capacity allows.
    pub fn context_window(&self, max_turns: usize) -> Vec<Turn> {
        let turns = self.turns.lock().unwrap();
        let start = turns.len().saturating_sub(max_turns);
        turns[start..].to_vec()
    }

    fn turn_count(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock().unwrap()
    }
}

// ============================================================
// SESSION STORE
// ============================================================

/// Keyed map of sessions with capacity-based eviction. The reference
/// behavior had no eviction at all; the cap bounds memory growth when
/// callers mint fresh session ids per request.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<SessionEntry>>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Get or lazily create the entry for a session key. Creating a session
    /// past the cap evicts the least recently active one. Sessions whose
    /// turn lock is held are mid-turn and never evicted; if every entry is
    /// busy the map briefly exceeds the cap instead of dropping a turn.
    pub fn entry(&self, session_id: &str) -> Arc<SessionEntry> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(entry) = sessions.get(session_id) {
            return Arc::clone(entry);
        }

        if sessions.len() >= self.max_sessions {
            let stalest = sessions
                .iter()
                .filter(|(_, entry)| entry.turn_lock.try_lock().is_ok())
                .min_by_key(|(_, entry)| entry.last_active())
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                sessions.remove(&id);
            }
        }

        let entry = Arc::new(SessionEntry::new());
        sessions.insert(session_id.to_string(), Arc::clone(&entry));
        entry
    }

    pub fn append(&self, session_id: &str, role: Role, content: &str) {
        self.entry(session_id).append(role, content);
    }

    /// Full transcript in insertion order. Unknown sessions yield an empty
    /// sequence, not an error, and are not created as a side effect.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .map(|entry| entry.history())
            .unwrap_or_default()
    }

    /// Clear a session. Resetting an unknown or already-empty session is a
    /// no-op.
    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(session_id);
    }

    /// Active sessions with their turn counts, for the listing endpoint
    pub fn session_summaries(&self) -> Vec<(String, usize)> {
        let sessions = self.sessions.lock().unwrap();
        let mut summaries: Vec<(String, usize)> = sessions
            .iter()
            .map(|(id, entry)| (id.clone(), entry.turn_count()))
            .collect();
        summaries.sort_by(|a, b| a.0.cmp(&b.0));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_history_ordering() {
        let store = SessionStore::new(100);
        store.append("s1", Role::User, "Bonjour");
        store.append("s1", Role::Assistant, "Bonjour !");
        store.append("s1", Role::User, "Quoi de neuf ?");

        let history = store.history("s1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "Bonjour");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].content, "Quoi de neuf ?");
    }

    #[test]
    fn test_unknown_session_is_empty_not_error() {
        let store = SessionStore::new(100);
        assert!(store.history("never-seen").is_empty());
        // history() must not create the session
        assert!(store.session_summaries().is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let store = SessionStore::new(100);
        store.append("s1", Role::User, "hello");
        store.reset("s1");
        assert!(store.history("s1").is_empty());
        // resetting again, and resetting an unknown session, are no-ops
        store.reset("s1");
        store.reset("ghost");
        assert!(store.history("s1").is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new(100);
        store.append("a", Role::User, "message for a");
        store.append("b", Role::User, "message for b");

        let a = store.history("a");
        let b = store.history("b");
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].content, "message for a");
        assert_eq!(b[0].content, "message for b");
    }

    #[test]
    fn test_context_window_keeps_most_recent() {
        let store = SessionStore::new(100);
        let entry = store.entry("s1");
        for i in 0..10 {
            entry.append(Role::User, &format!("turn {i}"));
        }

        let window = entry.context_window(4);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "turn 6");
        assert_eq!(window[3].content, "turn 9");

        // window larger than the transcript returns everything
        assert_eq!(entry.context_window(50).len(), 10);
    }

    #[test]
    fn test_capacity_eviction_drops_stalest() {
        let store = SessionStore::new(2);
        store.append("old", Role::User, "first");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append("fresh", Role::User, "second");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append("newest", Role::User, "third");

        assert!(store.history("old").is_empty());
        assert_eq!(store.history("fresh").len(), 1);
        assert_eq!(store.history("newest").len(), 1);
    }

    #[test]
    fn test_eviction_skips_sessions_mid_turn() {
        let store = SessionStore::new(2);
        let old = store.entry("old");
        old.append(Role::User, "first");
        // "old" is the stalest but its turn is in flight
        let _guard = old.turn_lock.try_lock().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append("fresh", Role::User, "second");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append("newest", Role::User, "third");

        // the idle "fresh" session was evicted instead of "old"
        assert_eq!(store.history("old").len(), 1);
        assert!(store.history("fresh").is_empty());
        assert_eq!(store.history("newest").len(), 1);
    }
}
