//! ensemble-core: real-time collaboration state synchronization for shared
//! practice sessions.
//!
//! This crate is the in-process engine behind multi-user sessions where
//! participants edit and observe shared state (cursor positions, role
//! assignments, content changes) concurrently over unreliable links:
//!
//! - **clock**: vector clocks for causal ordering between participants.
//! - **conflict**: deterministic resolution of concurrent updates.
//! - **retry**: bounded retry with backoff for transient apply failures.
//! - **snapshot**: versioned session state copies and recovery baselines.
//! - **session**: the session manager orchestrating all of the above.
//! - **metrics**: counters, timing samples, and the bounded error log.
//!
//! The engine defines no wire format; a transport layer (WebSocket or
//! otherwise) drives the public operations and observes emitted events
//! through registered listeners and sinks.

pub mod clock;
pub mod collaborator;
pub mod config;
pub mod conflict;
pub mod error;
pub mod event;
pub mod metrics;
pub mod retry;
pub mod session;
pub mod snapshot;

// Top-level re-exports for common usage
pub use crate::clock::{ClockOrdering, VectorClock};
pub use crate::collaborator::{roles, CollaboratorInfo};
pub use crate::config::EngineConfig;
pub use crate::conflict::{ConflictResolver, PendingUpdate};
pub use crate::error::{EnsembleError, Result};
pub use crate::event::{listener, EventKind, EventListener, EventSink, ListenerId, SessionEvent};
pub use crate::metrics::{ErrorLogEntry, MetricsReport};
pub use crate::retry::{RetryConfig, RetryDecision, RetryState};
pub use crate::session::SessionManager;
pub use crate::snapshot::{SessionSnapshot, SnapshotEntry, SnapshotStore};
