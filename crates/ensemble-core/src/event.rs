//! Session events and listener plumbing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// The fixed set of event kinds emitted by a session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Join,
    Leave,
    LineComplete,
    EmotionUpdate,
    TimingUpdate,
    Feedback,
    RoleChange,
    MetricsUpdate,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::LineComplete => "line_complete",
            EventKind::EmotionUpdate => "emotion_update",
            EventKind::TimingUpdate => "timing_update",
            EventKind::Feedback => "feedback",
            EventKind::RoleChange => "role_change",
            EventKind::MetricsUpdate => "metrics_update",
        }
    }
}

/// An immutable record of something that happened in a session.
///
/// Events are appended to the history in emission order and handed to
/// listeners as copies; they are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub session_id: String,
    pub user_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub(crate) fn new(kind: EventKind, session_id: &str, user_id: &str, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Handle returned by listener registration, used for removal.
pub type ListenerId = Uuid;

/// Async callback invoked for every event of the kind it was registered for.
///
/// Dispatch is fire-and-forget: each invocation runs on its own task, and a
/// failing listener is logged without affecting other listeners or the
/// emitting operation. Ordering across listeners is not guaranteed.
pub type EventListener =
    Arc<dyn Fn(SessionEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as an [`EventListener`].
pub fn listener<F, Fut>(f: F) -> EventListener
where
    F: Fn(SessionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Transport seam: receives every emitted event regardless of kind.
///
/// A WebSocket bridge (or any other delivery layer) implements this to fan
/// events out to remote participants. Delivery errors are logged and do not
/// propagate into the session manager.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn deliver(&self, event: SessionEvent) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_serde_tags() {
        let tag = serde_json::to_string(&EventKind::TimingUpdate).unwrap();
        assert_eq!(tag, "\"timing_update\"");
        let kind: EventKind = serde_json::from_str("\"role_change\"").unwrap();
        assert_eq!(kind, EventKind::RoleChange);
    }

    #[test]
    fn test_event_round_trip() {
        let event = SessionEvent::new(EventKind::Join, "s1", "alice", json!({"username": "Alice"}));
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: SessionEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, event.id);
        assert_eq!(decoded.kind, EventKind::Join);
        assert_eq!(decoded.data["username"], "Alice");
    }
}
