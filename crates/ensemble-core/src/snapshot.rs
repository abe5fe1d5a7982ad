//! Versioned, timestamped copies of session state.
//!
//! Snapshots are the recovery baseline: taking one captures every
//! collaborator's accepted state and clock; recovery restores the latest one.
//! Retention is age-based and in-memory only.

use crate::clock::VectorClock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One collaborator's captured state inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub last_known_state: Value,
    pub clock: VectorClock,
}

/// An immutable copy of a session's full state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub taken_at: DateTime<Utc>,
    /// user id -> captured state.
    pub collaborators: HashMap<String, SnapshotEntry>,
}

/// Registry of per-session snapshot lists, ordered oldest first.
pub struct SnapshotStore {
    snapshots: Arc<Mutex<HashMap<String, Vec<SessionSnapshot>>>>,
    max_age: Duration,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            max_age,
        }
    }

    /// Append a snapshot to the session's list.
    pub fn record(&self, session_id: &str, snapshot: SessionSnapshot) {
        let mut snapshots = self.snapshots.lock();
        snapshots
            .entry(session_id.to_string())
            .or_default()
            .push(snapshot);
    }

    /// Remove snapshots older than the configured maximum age.
    ///
    /// A zero max age empties the session's list. Returns the number of
    /// snapshots removed.
    pub fn cleanup(&self, session_id: &str) -> usize {
        let now = Utc::now();
        let mut snapshots = self.snapshots.lock();
        let Some(list) = snapshots.get_mut(session_id) else {
            return 0;
        };
        let before = list.len();
        list.retain(|s| {
            let age = (now - s.taken_at).to_std().unwrap_or(Duration::ZERO);
            age < self.max_age
        });
        let removed = before - list.len();
        if removed > 0 {
            debug!(session_id, removed, "evicted aged snapshots");
        }
        removed
    }

    /// The most recent snapshot for a session, if any.
    #[must_use]
    pub fn latest(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.snapshots
            .lock()
            .get(session_id)
            .and_then(|list| list.last().cloned())
    }

    /// Number of retained snapshots for a session.
    #[must_use]
    pub fn count(&self, session_id: &str) -> usize {
        self.snapshots
            .lock()
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Drop everything (test isolation / full reset).
    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}

impl Clone for SnapshotStore {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
            max_age: self.max_age,
        }
    }
}
