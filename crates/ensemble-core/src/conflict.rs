//! Deterministic resolution of concurrent session updates.
//!
//! When vector clocks show that two or more updates to the same session are
//! concurrent, every replica must still converge on one winner. The policy,
//! in order:
//!
//! 1. Higher explicit `priority` field wins (absent priority counts as 0).
//! 2. Lowest numeric value among the payload's competing scalar fields wins.
//! 3. Earliest `timestamp` wins.
//! 4. Lexicographically smaller user id wins (last-resort tie-break).
//!
//! Both priority branches collapse into a single ordering key, so resolution
//! is one comparator and order of arrival cannot change the outcome.

use crate::clock::VectorClock;
use crate::error::{EnsembleError, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Instant;
use tracing::debug;

/// Payload fields that never participate in the lowest-value comparison.
const RESERVED_FIELDS: [&str; 2] = ["timestamp", "priority"];

/// An update waiting inside the coalescing window, candidate for conflict
/// detection against later arrivals.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub user_id: String,
    pub payload: Value,
    pub clock: VectorClock,
    pub received_at: Instant,
}

impl PendingUpdate {
    #[must_use]
    pub fn new(user_id: &str, payload: Value, clock: VectorClock) -> Self {
        Self {
            user_id: user_id.to_string(),
            payload,
            clock,
            received_at: Instant::now(),
        }
    }
}

/// Ordering key derived from one update's payload.
///
/// Missing components order last (lowest priority, +inf value/timestamp), so
/// a partially comparable payload still resolves deterministically.
#[derive(Debug, Clone, Copy)]
struct SortKey {
    priority: f64,
    value: f64,
    timestamp: f64,
}

impl SortKey {
    fn cmp(&self, other: &SortKey) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| self.value.total_cmp(&other.value))
            .then_with(|| self.timestamp.total_cmp(&other.timestamp))
    }
}

/// Picks a deterministic winner among concurrent updates.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Select the winning update among the candidates.
    ///
    /// The winner is the same regardless of candidate order and is returned
    /// by value, so the candidate buffer can be a temporary. Fails with
    /// [`EnsembleError::ConflictResolution`] when a payload offers nothing to
    /// compare on, or when the candidate list is empty.
    pub fn resolve(&self, candidates: &[PendingUpdate]) -> Result<PendingUpdate> {
        if candidates.is_empty() {
            return Err(EnsembleError::ConflictResolution(
                "no candidate updates".into(),
            ));
        }

        let mut best: Option<(&PendingUpdate, SortKey)> = None;
        for update in candidates {
            let key = sort_key(update)?;
            best = match best {
                None => Some((update, key)),
                Some((cur, cur_key)) => {
                    let ord = key
                        .cmp(&cur_key)
                        .then_with(|| update.user_id.cmp(&cur.user_id));
                    if ord == Ordering::Less {
                        Some((update, key))
                    } else {
                        Some((cur, cur_key))
                    }
                }
            };
        }

        // best is always Some here; candidates was non-empty.
        let (winner, _) = best.ok_or_else(|| {
            EnsembleError::ConflictResolution("no resolvable candidate".into())
        })?;
        debug!(
            winner = %winner.user_id,
            candidates = candidates.len(),
            "conflict resolved"
        );
        Ok(winner.clone())
    }
}

fn sort_key(update: &PendingUpdate) -> Result<SortKey> {
    let Some(fields) = update.payload.as_object() else {
        return Err(EnsembleError::ConflictResolution(format!(
            "update payload from {} is not an object",
            update.user_id
        )));
    };

    let priority = fields.get("priority").and_then(Value::as_f64);
    let timestamp = fields.get("timestamp").and_then(Value::as_f64);
    let value = fields
        .iter()
        .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
        .filter_map(|(_, v)| v.as_f64())
        .fold(None, |min: Option<f64>, v| {
            Some(min.map_or(v, |m| if v < m { v } else { m }))
        });

    if priority.is_none() && timestamp.is_none() && value.is_none() {
        return Err(EnsembleError::ConflictResolution(format!(
            "update payload from {} has no comparable fields",
            update.user_id
        )));
    }

    Ok(SortKey {
        priority: priority.unwrap_or(0.0),
        value: value.unwrap_or(f64::INFINITY),
        timestamp: timestamp.unwrap_or(f64::INFINITY),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(user_id: &str, payload: Value) -> PendingUpdate {
        let mut clock = VectorClock::new();
        clock.increment(user_id);
        PendingUpdate::new(user_id, payload, clock)
    }

    #[test]
    fn test_lowest_value_wins() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!({"cursor": 100, "timestamp": 1000}));
        let b = update("u2", json!({"cursor": 200, "timestamp": 1001}));

        // The winner must outlive the candidate buffer it was chosen from.
        let winner = resolver.resolve(&[a, b]).unwrap();
        assert_eq!(winner.user_id, "u1");
        assert_eq!(winner.payload["cursor"], json!(100));
    }

    #[test]
    fn test_priority_beats_lower_value() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!({"cursor": 100, "timestamp": 1000}));
        let b = update("u2", json!({"cursor": 200, "timestamp": 1001, "priority": 5}));

        let winner = resolver.resolve(&[a, b]).unwrap();
        assert_eq!(winner.user_id, "u2");
    }

    #[test]
    fn test_timestamp_breaks_value_tie() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!({"cursor": 100, "timestamp": 2000}));
        let b = update("u2", json!({"cursor": 100, "timestamp": 1000}));

        let winner = resolver.resolve(&[a, b]).unwrap();
        assert_eq!(winner.user_id, "u2");
    }

    #[test]
    fn test_user_id_is_last_resort() {
        let resolver = ConflictResolver::new();
        let a = update("u2", json!({"cursor": 100, "timestamp": 1000}));
        let b = update("u1", json!({"cursor": 100, "timestamp": 1000}));

        let winner = resolver.resolve(&[a, b]).unwrap();
        assert_eq!(winner.user_id, "u1");
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!({"cursor": 100, "timestamp": 1001}));
        let b = update("u2", json!({"cursor": 200, "timestamp": 1000}));

        let forward = resolver.resolve(&[a.clone(), b.clone()]).unwrap().user_id;
        let reverse = resolver.resolve(&[b, a]).unwrap().user_id;
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!("not an object"));
        let b = update("u2", json!({"cursor": 200, "timestamp": 1000}));

        let err = resolver.resolve(&[a, b]).unwrap_err();
        assert!(matches!(err, EnsembleError::ConflictResolution(_)));
    }

    #[test]
    fn test_payload_without_comparable_fields_rejected() {
        let resolver = ConflictResolver::new();
        let a = update("u1", json!({"note": "free text"}));

        let err = resolver.resolve(&[a]).unwrap_err();
        assert!(matches!(err, EnsembleError::ConflictResolution(_)));
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let resolver = ConflictResolver::new();
        assert!(resolver.resolve(&[]).is_err());
    }
}
