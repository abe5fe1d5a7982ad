//! Vector clocks for causal ordering between collaborators.
//!
//! Each collaborator carries one logical counter per participant. Local
//! events increment the owner's counter; merging takes the component-wise
//! maximum. Comparing two clocks yields a partial causal order: one side
//! happened before the other, they are equal, or they are concurrent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordering result when comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// This clock causally precedes the other.
    Before,
    /// This clock causally follows the other.
    After,
    /// Neither clock dominates; the events are concurrent.
    Concurrent,
    /// The clocks are identical.
    Equal,
}

/// A vector clock tracking per-participant logical counters.
///
/// Missing entries are treated as counter 0, so clocks over disjoint
/// participant sets still compare meaningfully.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty vector clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for the given participant.
    pub fn increment(&mut self, node_id: &str) {
        let counter = self.counters.entry(node_id.to_string()).or_insert(0);
        *counter += 1;
    }

    /// Get the counter for a participant (0 when absent).
    #[must_use]
    pub fn get(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }

    /// Merge another clock into this one (component-wise max).
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &counter) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Compare this clock against another.
    #[must_use]
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_lte = true;
        let mut other_lte = true;

        let all_keys: std::collections::BTreeSet<&String> =
            self.counters.keys().chain(other.counters.keys()).collect();

        for key in all_keys {
            let s = self.get(key);
            let o = other.get(key);
            if s > o {
                self_lte = false;
            }
            if o > s {
                other_lte = false;
            }
        }

        match (self_lte, other_lte) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// True iff this clock causally precedes the other.
    #[must_use]
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    /// True iff neither clock dominates the other.
    #[must_use]
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// The internal counter map.
    #[must_use]
    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut clock = VectorClock::new();
        assert_eq!(clock.get("alice"), 0);
        clock.increment("alice");
        clock.increment("alice");
        assert_eq!(clock.get("alice"), 2);
        assert_eq!(clock.get("bob"), 0);
    }

    #[test]
    fn test_happens_before() {
        let mut a = VectorClock::new();
        a.increment("alice");

        let mut b = a.clone();
        b.increment("alice");

        assert!(a.happens_before(&b));
        assert!(!b.happens_before(&a));
        assert_eq!(b.compare(&a), ClockOrdering::After);
    }

    #[test]
    fn test_concurrent_clocks() {
        let mut a = VectorClock::new();
        a.increment("alice");
        let mut b = VectorClock::new();
        b.increment("bob");

        assert!(a.is_concurrent_with(&b));
        assert!(b.is_concurrent_with(&a));
    }

    #[test]
    fn test_merge_takes_componentwise_max() {
        let mut a = VectorClock::new();
        a.increment("alice");
        a.increment("alice");
        let mut b = VectorClock::new();
        b.increment("alice");
        b.increment("bob");

        a.merge(&b);
        assert_eq!(a.get("alice"), 2);
        assert_eq!(a.get("bob"), 1);
    }

    #[test]
    fn test_merge_idempotent() {
        let mut a = VectorClock::new();
        a.increment("alice");
        let mut b = VectorClock::new();
        b.increment("bob");

        a.merge(&b);
        let merged_once = a.clone();
        a.merge(&b);
        assert_eq!(a, merged_once);

        let snapshot = a.clone();
        a.merge(&snapshot);
        assert_eq!(a, snapshot);
    }

    #[test]
    fn test_comparison_totality() {
        // Exactly one of {before, after, concurrent, equal} must hold for
        // every pair.
        let mut clocks = Vec::new();
        let empty = VectorClock::new();
        clocks.push(empty.clone());

        let mut a = VectorClock::new();
        a.increment("alice");
        clocks.push(a.clone());

        let mut b = VectorClock::new();
        b.increment("bob");
        clocks.push(b.clone());

        let mut ab = a.clone();
        ab.merge(&b);
        clocks.push(ab);

        for x in &clocks {
            for y in &clocks {
                let outcomes = [
                    x.happens_before(y),
                    y.happens_before(x),
                    x.is_concurrent_with(y),
                    x.compare(y) == ClockOrdering::Equal,
                ];
                assert_eq!(
                    outcomes.iter().filter(|&&o| o).count(),
                    1,
                    "non-total comparison for {:?} vs {:?}",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_missing_entries_are_zero() {
        let mut a = VectorClock::new();
        a.increment("alice");
        let b = VectorClock::new();

        assert_eq!(b.compare(&a), ClockOrdering::Before);
        assert_eq!(a.compare(&b), ClockOrdering::After);
    }
}
