//! Evaluation sessions.
//!
//! A session pairs one task with the subject and carries the context id the
//! subject uses to keep conversational state. The store evicts a session as
//! soon as it reaches a terminal state, so it never grows across runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSession {
    pub context_id: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
}

/// Live sessions keyed by context id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, EvaluationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, EvaluationSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a pending session, generating a context id when none is given.
    pub fn create(&self, task_id: &str, context_id: Option<&str>) -> EvaluationSession {
        let session = EvaluationSession {
            context_id: context_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            task_id: task_id.to_string(),
            started_at: Utc::now(),
            state: SessionState::Pending,
        };
        self.lock()
            .insert(session.context_id.clone(), session.clone());
        session
    }

    pub fn get(&self, context_id: &str) -> Option<EvaluationSession> {
        self.lock().get(context_id).cloned()
    }

    /// Closes a session with a terminal state and evicts it.
    ///
    /// Returns the closed session, or `None` if it was not open.
    pub fn complete(&self, context_id: &str, state: SessionState) -> Option<EvaluationSession> {
        let mut session = self.lock().remove(context_id)?;
        session.state = state;
        Some(session)
    }

    /// Evicts a session without closing it.
    pub fn evict(&self, context_id: &str) -> Option<EvaluationSession> {
        self.lock().remove(context_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_complete() {
        let store = SessionStore::new();
        let session = store.create("pm-send-hello-message", None);

        assert_eq!(session.state, SessionState::Pending);
        assert!(!session.context_id.is_empty());
        assert_eq!(store.get(&session.context_id), Some(session.clone()));

        let closed = store
            .complete(&session.context_id, SessionState::Completed)
            .expect("open session");
        assert_eq!(closed.state, SessionState::Completed);
        assert!(store.is_empty());
        assert!(store.complete(&session.context_id, SessionState::Failed).is_none());
    }

    #[test]
    fn test_explicit_context_id() {
        let store = SessionStore::new();
        let session = store.create("hr-salary-analysis", Some("ctx-fixed"));
        assert_eq!(session.context_id, "ctx-fixed");
        assert_eq!(store.len(), 1);
        assert!(store.evict("ctx-fixed").is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let a = store.create("a", None);
        let b = store.create("b", None);
        assert_ne!(a.context_id, b.context_id);
        store.complete(&a.context_id, SessionState::Failed);
        assert_eq!(store.get(&b.context_id).map(|s| s.task_id), Some("b".to_string()));
    }
}
