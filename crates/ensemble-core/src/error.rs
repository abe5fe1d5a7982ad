//! Error types for collaboration engine operations.

use thiserror::Error;

/// Result type for collaboration engine operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Errors that can occur while operating on shared sessions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EnsembleError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("collaborator {user} not found in session {session}")]
    CollaboratorNotFound { session: String, user: String },

    #[error("conflict resolution failed: {0}")]
    ConflictResolution(String),

    #[error("operation failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("no snapshot available for session: {0}")]
    NoSnapshotAvailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Anyhow(String),
}

impl From<anyhow::Error> for EnsembleError {
    fn from(err: anyhow::Error) -> Self {
        EnsembleError::Anyhow(err.to_string())
    }
}

impl EnsembleError {
    /// Check if this error is retryable.
    ///
    /// Transient failures from caller-supplied operations are retried; domain
    /// errors like an unknown session or a malformed conflict payload are
    /// surfaced immediately.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnsembleError::Internal(_) | EnsembleError::Anyhow(_)
        )
    }

    /// The tag this error is recorded under in the error log.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EnsembleError::SessionNotFound(_) => "session_not_found",
            EnsembleError::CollaboratorNotFound { .. } => "collaborator_not_found",
            EnsembleError::ConflictResolution(_) => "conflict_resolution",
            EnsembleError::RetryExhausted { .. } => "retry_exhausted",
            EnsembleError::NoSnapshotAvailable(_) => "no_snapshot_available",
            EnsembleError::Json(_) => "json",
            EnsembleError::Internal(_) => "internal",
            EnsembleError::Anyhow(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(EnsembleError::Internal("store unavailable".into()).is_retryable());
    }

    #[test]
    fn test_session_not_found_not_retryable() {
        assert!(!EnsembleError::SessionNotFound("s1".into()).is_retryable());
    }

    #[test]
    fn test_retry_exhausted_not_retryable() {
        let err = EnsembleError::RetryExhausted {
            attempts: 3,
            last_error: "timeout".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "retry_exhausted");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: EnsembleError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, EnsembleError::Anyhow(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
