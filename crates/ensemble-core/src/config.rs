//! Engine configuration.
//!
//! This module defines the [`EngineConfig`] struct that controls session
//! manager behavior: snapshot retention, the concurrency coalescing window,
//! retry policy, and observability bounds.
//!
//! # Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `max_snapshot_age` | 24h | Snapshots older than this are evicted |
//! | `coalesce_window` | 150ms | Window for concurrent-update detection |
//! | `retry` | see [`RetryConfig`] | Bounded retry policy for applies |
//! | `max_error_log_entries` | 256 | Error log ring size |
//! | `max_timing_samples` | 1024 | Per-metric timing sample bound |
//! | `max_events_in_history` | 0 | Event history bound (0 = unbounded) |
//!
//! # Examples
//!
//! ```
//! use ensemble_core::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig {
//!     max_snapshot_age: Duration::from_secs(3600),
//!     ..Default::default()
//! };
//! assert_eq!(config.max_error_log_entries, 256);
//! ```

use crate::retry::RetryConfig;
use std::time::Duration;

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Snapshots older than this are removed on cleanup.
    ///
    /// A zero age makes every snapshot immediately eligible for removal.
    pub max_snapshot_age: Duration,

    /// How long an applied update stays visible for concurrency detection.
    ///
    /// Updates from different users landing within this window are checked
    /// for vector-clock concurrency and routed through conflict resolution.
    pub coalesce_window: Duration,

    /// Retry policy for the durable apply step.
    pub retry: RetryConfig,

    /// Maximum retained error log entries; the oldest are evicted.
    pub max_error_log_entries: usize,

    /// Maximum retained timing samples per metric series.
    pub max_timing_samples: usize,

    /// Maximum retained events in the history log. 0 means unbounded.
    pub max_events_in_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_snapshot_age: Duration::from_secs(24 * 60 * 60),
            coalesce_window: Duration::from_millis(150),
            retry: RetryConfig::default(),
            max_error_log_entries: 256,
            max_timing_samples: 1024,
            max_events_in_history: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_snapshot_age, Duration::from_secs(86400));
        assert_eq!(config.coalesce_window, Duration::from_millis(150));
        assert_eq!(config.max_error_log_entries, 256);
        assert_eq!(config.max_events_in_history, 0);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig {
            max_snapshot_age: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.max_snapshot_age, Duration::ZERO);
        assert_eq!(config.max_timing_samples, 1024);
    }
}
