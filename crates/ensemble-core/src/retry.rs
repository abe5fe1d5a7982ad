//! Retry configuration and backoff state for fallible state applies.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (always >= 2).
    pub max_attempts: u32,
    /// Initial backoff duration between attempts.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum attempt count. Values below 2 are clamped: a
    /// bounded retry always allows at least one retry.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(2);
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }
}

/// Decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then attempt again.
    Retry(Duration),
    /// Attempt budget exhausted.
    GiveUp,
}

/// Tracks attempts and the current backoff for one operation.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    current_backoff: Duration,
    config: RetryConfig,
}

impl RetryState {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            attempts: 1,
            current_backoff: config.initial_backoff,
            config,
        }
    }

    /// The current attempt number (1-based).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and decide whether to retry.
    ///
    /// Backoff grows additively by the initial backoff per retry, capped at
    /// the configured maximum.
    pub fn next_delay(&mut self) -> RetryDecision {
        if self.attempts >= self.config.max_attempts {
            return RetryDecision::GiveUp;
        }
        self.attempts += 1;

        let wait = self.current_backoff;
        self.current_backoff = std::cmp::min(
            self.current_backoff + self.config.initial_backoff,
            self.config.max_backoff,
        );
        RetryDecision::Retry(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_max_attempts_clamped() {
        let config = RetryConfig::new().with_max_attempts(0);
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn test_state_respects_attempt_budget() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(10));
        let mut state = RetryState::new(config);

        assert!(matches!(state.next_delay(), RetryDecision::Retry(_)));
        assert!(matches!(state.next_delay(), RetryDecision::Retry(_)));
        assert_eq!(state.next_delay(), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig::new()
            .with_max_attempts(10)
            .with_initial_backoff(Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(250));
        let mut state = RetryState::new(config);

        assert_eq!(
            state.next_delay(),
            RetryDecision::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            state.next_delay(),
            RetryDecision::Retry(Duration::from_millis(200))
        );
        // Capped at max_backoff from here on.
        assert_eq!(
            state.next_delay(),
            RetryDecision::Retry(Duration::from_millis(250))
        );
        assert_eq!(
            state.next_delay(),
            RetryDecision::Retry(Duration::from_millis(250))
        );
    }
}
