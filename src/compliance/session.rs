//! Session Tracking
//!
//! Groups attempts under a caller-supplied or generated session id for
//! reporting. Sessions are created on first sight and live until the process
//! exits or they sit idle longer than the configured TTL.
//!
//! The registry lock is synchronous and never held across an await, so a
//! reservation settling in `Drop` can still update its session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::ledger::Outcome;

/// Usage summary for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: String,

    /// First time the session was seen
    pub created_at: DateTime<Utc>,

    /// Every touch, admitted or not
    pub event_count: u64,

    /// Time of the latest touch
    pub last_event_at: DateTime<Utc>,

    /// Attempts that produced a payload
    pub success_count: u64,

    /// Attempts that failed or timed out
    pub failure_count: u64,

    /// Attempts refused by admission control
    pub rejected_count: u64,
}

impl Session {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            event_count: 0,
            last_event_at: now,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
        }
    }

    fn apply(&mut self, now: DateTime<Utc>, outcome: Outcome) {
        self.event_count += 1;
        self.last_event_at = self.last_event_at.max(now);
        match outcome {
            Outcome::Success => self.success_count += 1,
            Outcome::Failure => self.failure_count += 1,
            Outcome::Rejected => self.rejected_count += 1,
        }
    }
}

/// Generate a session id for callers that do not bring one
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// In-memory session registry
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    /// Sessions by id
    sessions: Arc<RwLock<HashMap<String, Session>>>,

    /// Idle sessions older than this are evicted
    idle_ttl: Option<chrono::Duration>,
}

impl SessionTracker {
    /// Create a tracker that never evicts
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that evicts sessions idle longer than `ttl`
    pub fn with_idle_ttl(ttl: chrono::Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl: Some(ttl),
        }
    }

    /// Record an event against a session, creating it on first sight
    pub fn touch(&self, session_id: &str, now: DateTime<Utc>, outcome: Outcome) -> Session {
        let mut sessions = self.write();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string(), now));
        session.apply(now, outcome);
        session.clone()
    }

    /// Copy of a session, if it exists
    pub fn snapshot(&self, session_id: &str) -> Option<Session> {
        self.read().get(session_id).cloned()
    }

    /// Copy of every session
    pub fn sessions(&self) -> Vec<Session> {
        self.read().values().cloned().collect()
    }

    /// Drop sessions idle longer than the TTL
    ///
    /// Returns the number of evicted sessions.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_event_at <= ttl);
        before - sessions.len()
    }

    /// Number of tracked sessions
    pub fn count(&self) -> usize {
        self.read().len()
    }

    // A poisoned tally is still a usable tally
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
