//! Per-session participant state.

use crate::clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Well-known session role names.
///
/// Roles are exclusive per session: at most one collaborator holds a given
/// role at a time.
pub mod roles {
    pub const NARRATOR: &str = "narrator";
    pub const DIRECTOR: &str = "director";
    pub const PERFORMER: &str = "performer";
    pub const OBSERVER: &str = "observer";
}

/// The tracked state of one participant in one session.
///
/// Owned exclusively by the session manager's registry; accessors hand out
/// copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorInfo {
    pub user_id: String,
    pub username: String,
    /// Currently held exclusive role, if any.
    pub role: Option<String>,
    pub active: bool,
    /// Position pointer within the shared material.
    pub current_line: Option<u64>,
    /// Free-form per-user performance measurements.
    pub performance_metrics: HashMap<String, Value>,
    /// The most recently accepted state payload. Always a JSON object; once
    /// an update has been applied it carries at least a `timestamp` field.
    pub last_known_state: Value,
    pub clock: VectorClock,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CollaboratorInfo {
    pub(crate) fn new(user_id: &str, username: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role: None,
            active: true,
            current_line: None,
            performance_metrics: HashMap::new(),
            last_known_state: Value::Object(Map::new()),
            clock: VectorClock::new(),
            joined_at: now,
            last_seen: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_collaborator_defaults() {
        let info = CollaboratorInfo::new("u1", "Alice");
        assert!(info.active);
        assert!(info.role.is_none());
        assert!(info.current_line.is_none());
        assert!(info.last_known_state.as_object().unwrap().is_empty());
        assert_eq!(info.clock.get("u1"), 0);
    }
}
