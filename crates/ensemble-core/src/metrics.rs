//! Engine metrics aggregation and the bounded error log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Monotonically accumulating counters for one session manager instance.
///
/// Initialized at construction, reset only by an explicit [`reset`]. Timing
/// samples are bounded; counters are not.
///
/// [`reset`]: EngineMetrics::reset
#[derive(Debug)]
pub struct EngineMetrics {
    started_at: Instant,
    max_samples: usize,

    total_conflicts: u64,
    resolved_conflicts: u64,
    resolution_times: VecDeque<Duration>,

    total_retries: u64,
    retried_operations: u64,
    retried_successes: u64,
    retry_times: VecDeque<Duration>,

    total_recoveries: u64,
    successful_recoveries: u64,
    recovery_times: VecDeque<Duration>,

    errors: u64,
}

impl EngineMetrics {
    #[must_use]
    pub fn new(max_samples: usize) -> Self {
        Self {
            started_at: Instant::now(),
            max_samples,
            total_conflicts: 0,
            resolved_conflicts: 0,
            resolution_times: VecDeque::new(),
            total_retries: 0,
            retried_operations: 0,
            retried_successes: 0,
            retry_times: VecDeque::new(),
            total_recoveries: 0,
            successful_recoveries: 0,
            recovery_times: VecDeque::new(),
            errors: 0,
        }
    }

    pub(crate) fn record_conflict(&mut self) {
        self.total_conflicts += 1;
    }

    pub(crate) fn record_resolution(&mut self, elapsed: Duration) {
        self.resolved_conflicts += 1;
        push_sample(&mut self.resolution_times, elapsed, self.max_samples);
    }

    /// One attempt beyond the first: counts toward `total_retries`.
    pub(crate) fn record_retry_attempt(&mut self, elapsed: Duration) {
        self.total_retries += 1;
        push_sample(&mut self.retry_times, elapsed, self.max_samples);
    }

    pub(crate) fn record_retried_operation(&mut self) {
        self.retried_operations += 1;
    }

    pub(crate) fn record_retried_success(&mut self) {
        self.retried_successes += 1;
    }

    pub(crate) fn record_recovery_attempt(&mut self) {
        self.total_recoveries += 1;
    }

    pub(crate) fn record_recovery_success(&mut self, elapsed: Duration) {
        self.successful_recoveries += 1;
        push_sample(&mut self.recovery_times, elapsed, self.max_samples);
    }

    pub(crate) fn record_error(&mut self) {
        self.errors += 1;
    }

    pub(crate) fn reset(&mut self) {
        *self = EngineMetrics::new(self.max_samples);
    }

    /// Build a point-in-time report.
    #[must_use]
    pub fn report(&self, active_sessions: usize) -> MetricsReport {
        MetricsReport {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            active_sessions,
            total_conflicts: self.total_conflicts,
            resolved_conflicts: self.resolved_conflicts,
            avg_resolution_time_ms: avg_ms(&self.resolution_times),
            total_retries: self.total_retries,
            retry_success_rate: if self.retried_operations == 0 {
                0.0
            } else {
                self.retried_successes as f64 / self.retried_operations as f64
            },
            avg_retry_time_ms: avg_ms(&self.retry_times),
            total_recoveries: self.total_recoveries,
            successful_recoveries: self.successful_recoveries,
            avg_recovery_time_ms: avg_ms(&self.recovery_times),
            error_count: self.errors,
        }
    }
}

fn push_sample(samples: &mut VecDeque<Duration>, elapsed: Duration, max: usize) {
    if max > 0 && samples.len() >= max {
        samples.pop_front();
    }
    samples.push_back(elapsed);
}

fn avg_ms(samples: &VecDeque<Duration>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: Duration = samples.iter().sum();
    total.as_secs_f64() * 1000.0 / samples.len() as f64
}

/// Read-only metrics snapshot handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub uptime_secs: f64,
    pub active_sessions: usize,
    pub total_conflicts: u64,
    pub resolved_conflicts: u64,
    pub avg_resolution_time_ms: f64,
    pub total_retries: u64,
    /// Successes after >= 1 retry over operations that required a retry.
    pub retry_success_rate: f64,
    pub avg_retry_time_ms: f64,
    pub total_recoveries: u64,
    pub successful_recoveries: u64,
    pub avg_recovery_time_ms: f64,
    pub error_count: u64,
}

/// One recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub details: String,
}

/// Append-only bounded error log; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct ErrorLog {
    entries: VecDeque<ErrorLogEntry>,
    max_entries: usize,
}

impl ErrorLog {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn push(&mut self, kind: &str, details: impl Into<String>) {
        let details = details.into();
        debug!(kind, %details, "error logged");
        if self.max_entries > 0 && self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(ErrorLogEntry {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            details,
        });
    }

    /// Entries oldest first, optionally filtered by kind.
    #[must_use]
    pub fn entries(&self, kind: Option<&str>) -> Vec<ErrorLogEntry> {
        self.entries
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
