//! Collaboration session manager.
//!
//! The manager owns every per-session registry (collaborators, exclusive
//! roles, coalescing window), the global event history, the snapshot store,
//! and the metrics/error-log aggregates. All mutation flows through it; the
//! transport layer only calls the public operations and observes events
//! through registered listeners and sinks.
//!
//! The update pipeline for [`update_state`]: increment the author's vector
//! clock, detect concurrency against recent updates inside the coalescing
//! window, resolve conflicts to a session-wide winner, apply through the
//! retry engine, then emit a state event followed by a metrics event.
//!
//! [`update_state`]: SessionManager::update_state

use crate::clock::VectorClock;
use crate::collaborator::CollaboratorInfo;
use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, PendingUpdate};
use crate::error::{EnsembleError, Result};
use crate::event::{EventKind, EventListener, EventSink, ListenerId, SessionEvent};
use crate::metrics::{EngineMetrics, ErrorLog, ErrorLogEntry, MetricsReport};
use crate::retry::{RetryDecision, RetryState};
use crate::snapshot::{SessionSnapshot, SnapshotEntry, SnapshotStore};
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct SessionState {
    collaborators: HashMap<String, CollaboratorInfo>,
    /// role name -> holder user id; a role has at most one holder.
    active_roles: HashMap<String, String>,
    /// Applied updates still visible for concurrency detection.
    recent_updates: Vec<PendingUpdate>,
}

/// Orchestrator for shared practice sessions.
///
/// Explicitly constructed and injectable; `Clone` shares the underlying
/// registries, so the owning application can hand the same manager to
/// multiple transport tasks.
#[derive(Clone)]
pub struct SessionManager {
    config: EngineConfig,
    sessions: Arc<Mutex<HashMap<String, SessionState>>>,
    history: Arc<Mutex<VecDeque<SessionEvent>>>,
    listeners: Arc<Mutex<HashMap<EventKind, Vec<(ListenerId, EventListener)>>>>,
    sinks: Arc<Mutex<Vec<Arc<dyn EventSink>>>>,
    snapshots: SnapshotStore,
    resolver: ConflictResolver,
    metrics: Arc<Mutex<EngineMetrics>>,
    error_log: Arc<Mutex<ErrorLog>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            snapshots: SnapshotStore::new(config.max_snapshot_age),
            metrics: Arc::new(Mutex::new(EngineMetrics::new(config.max_timing_samples))),
            error_log: Arc::new(Mutex::new(ErrorLog::new(config.max_error_log_entries))),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(VecDeque::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            sinks: Arc::new(Mutex::new(Vec::new())),
            resolver: ConflictResolver::new(),
            config,
        }
    }

    /// Add a participant to a session, creating the session on first join.
    ///
    /// Re-adding an existing participant only refreshes the username; a
    /// `join` event is emitted for fresh joins only.
    pub async fn add_collaborator(&self, user_id: &str, username: &str, session_id: &str) {
        let fresh = {
            let mut sessions = self.sessions.lock();
            let session = sessions.entry(session_id.to_string()).or_default();
            match session.collaborators.get_mut(user_id) {
                Some(existing) => {
                    existing.username = username.to_string();
                    existing.last_seen = Utc::now();
                    false
                }
                None => {
                    session
                        .collaborators
                        .insert(user_id.to_string(), CollaboratorInfo::new(user_id, username));
                    true
                }
            }
        };

        if fresh {
            debug!(session_id, user_id, "collaborator joined");
            self.emit(SessionEvent::new(
                EventKind::Join,
                session_id,
                user_id,
                json!({ "username": username }),
            ));
        }
    }

    /// Remove a participant, releasing any held role. No-op when absent.
    pub async fn remove_collaborator(&self, user_id: &str, session_id: &str) {
        let removed = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let Some(info) = session.collaborators.remove(user_id) else {
                return;
            };
            if let Some(role) = &info.role {
                session.active_roles.remove(role);
            }
            info
        };

        debug!(session_id, user_id, "collaborator left");
        self.emit(SessionEvent::new(
            EventKind::Leave,
            session_id,
            user_id,
            json!({ "username": removed.username }),
        ));
    }

    /// Try to assign an exclusive role.
    ///
    /// Returns false when the role is held by someone else, or when the
    /// session or user is unknown; role contention is expected, not an
    /// error. A successful assignment releases the user's previous role.
    pub async fn assign_role(&self, user_id: &str, role: &str, session_id: &str) -> bool {
        {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                return false;
            };
            if !session.collaborators.contains_key(user_id) {
                return false;
            }
            if let Some(holder) = session.active_roles.get(role) {
                if holder == user_id {
                    return true;
                }
                debug!(session_id, role, holder = %holder, "role already held");
                return false;
            }

            let previous = session
                .collaborators
                .get(user_id)
                .and_then(|c| c.role.clone());
            if let Some(prev_role) = previous {
                session.active_roles.remove(&prev_role);
            }
            session
                .active_roles
                .insert(role.to_string(), user_id.to_string());
            if let Some(collab) = session.collaborators.get_mut(user_id) {
                collab.role = Some(role.to_string());
            }
        }

        self.emit(SessionEvent::new(
            EventKind::RoleChange,
            session_id,
            user_id,
            json!({ "role": role, "action": "assigned" }),
        ));
        true
    }

    /// Free a role and clear its holder's `role` field. No-op when unheld.
    pub async fn release_role(&self, role: &str, session_id: &str) {
        let holder = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let Some(user_id) = session.active_roles.remove(role) else {
                return;
            };
            if let Some(collab) = session.collaborators.get_mut(&user_id) {
                collab.role = None;
            }
            user_id
        };

        self.emit(SessionEvent::new(
            EventKind::RoleChange,
            session_id,
            &holder,
            json!({ "role": role, "action": "released" }),
        ));
    }

    /// Apply a state update from one participant.
    ///
    /// Concurrent updates (per vector clock) from other participants inside
    /// the coalescing window are resolved to a single winner, and every
    /// involved collaborator converges on the winning state.
    pub async fn update_state(&self, session_id: &str, user_id: &str, updates: Value) -> Result<()> {
        if !updates.is_object() {
            let err = EnsembleError::Internal("update payload must be a JSON object".into());
            self.record_failure(err.kind(), err.to_string());
            return Err(err);
        }

        // Clock increment and concurrency detection are atomic with respect
        // to other operations on the registry.
        let (incoming, concurrent) = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                let err = EnsembleError::SessionNotFound(session_id.to_string());
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            };
            let Some(collab) = session.collaborators.get_mut(user_id) else {
                let err = EnsembleError::CollaboratorNotFound {
                    session: session_id.to_string(),
                    user: user_id.to_string(),
                };
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            };

            collab.clock.increment(user_id);
            let clock = collab.clock.clone();

            let window = self.config.coalesce_window;
            session
                .recent_updates
                .retain(|u| u.received_at.elapsed() <= window);

            let incoming = PendingUpdate::new(user_id, updates, clock);
            let concurrent: Vec<PendingUpdate> = session
                .recent_updates
                .iter()
                .filter(|u| u.user_id != user_id && u.clock.is_concurrent_with(&incoming.clock))
                .cloned()
                .collect();
            (incoming, concurrent)
        };

        let (winner_user, winner_payload, involved, merged_clock, resolved) = if concurrent
            .is_empty()
        {
            (
                user_id.to_string(),
                incoming.payload.clone(),
                vec![user_id.to_string()],
                None,
                false,
            )
        } else {
            self.metrics.lock().record_conflict();
            let started = Instant::now();

            let mut candidates = concurrent.clone();
            candidates.push(incoming.clone());
            let winner = match self.resolver.resolve(&candidates) {
                Ok(winner) => winner,
                Err(err) => {
                    self.record_failure(err.kind(), err.to_string());
                    return Err(err);
                }
            };
            self.metrics.lock().record_resolution(started.elapsed());

            let mut merged = incoming.clock.clone();
            for update in &concurrent {
                merged.merge(&update.clock);
            }
            let mut involved: Vec<String> =
                candidates.iter().map(|u| u.user_id.clone()).collect();
            involved.sort();
            involved.dedup();
            (
                winner.user_id.clone(),
                winner.payload.clone(),
                involved,
                Some(merged),
                true,
            )
        };

        // Durable apply, retried on transient failure.
        let mgr = self.clone();
        let sid = session_id.to_string();
        let uids = involved.clone();
        let payload = winner_payload.clone();
        let clock = merged_clock.clone();
        self.retry_operation(session_id, user_id, move |_attempt| {
            let mgr = mgr.clone();
            let sid = sid.clone();
            let uids = uids.clone();
            let payload = payload.clone();
            let clock = clock.clone();
            Box::pin(async move { mgr.apply_payload(&sid, &uids, &payload, clock.as_ref()) })
        })
        .await?;

        // Only an accepted update participates in later conflict detection.
        {
            let mut sessions = self.sessions.lock();
            if let Some(session) = sessions.get_mut(session_id) {
                session.recent_updates.push(incoming.clone());
            }
        }

        self.emit(SessionEvent::new(
            state_event_kind(&incoming.payload),
            session_id,
            user_id,
            json!({
                "updates": incoming.payload,
                "applied": winner_payload,
                "resolved_conflict": resolved,
                "winner": winner_user,
            }),
        ));
        let report = self.get_metrics();
        self.emit(SessionEvent::new(
            EventKind::MetricsUpdate,
            session_id,
            user_id,
            serde_json::to_value(&report).unwrap_or(Value::Null),
        ));
        Ok(())
    }

    /// Record feedback from one participant to another.
    ///
    /// Both participants must be present in the session.
    pub async fn provide_feedback(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        feedback: Value,
        session_id: &str,
    ) -> Result<()> {
        {
            let sessions = self.sessions.lock();
            let Some(session) = sessions.get(session_id) else {
                let err = EnsembleError::SessionNotFound(session_id.to_string());
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            };
            for user in [from_user_id, to_user_id] {
                if !session.collaborators.contains_key(user) {
                    let err = EnsembleError::CollaboratorNotFound {
                        session: session_id.to_string(),
                        user: user.to_string(),
                    };
                    self.record_failure(err.kind(), err.to_string());
                    return Err(err);
                }
            }
        }

        self.emit(SessionEvent::new(
            EventKind::Feedback,
            session_id,
            from_user_id,
            json!({ "to": to_user_id, "feedback": feedback }),
        ));
        Ok(())
    }

    /// Execute a fallible operation with bounded retry and backoff.
    ///
    /// Every attempt beyond the first counts toward `total_retries` and
    /// records a retry-time sample. Exhaustion is logged as
    /// `retry_exhausted` and surfaces the final error.
    pub async fn retry_operation<T, F>(&self, session_id: &str, user_id: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> BoxFuture<'static, Result<T>>,
    {
        let mut state = RetryState::new(self.config.retry.clone());
        let mut retried = false;
        loop {
            let attempt = state.attempts();
            let started = Instant::now();
            let result = op(attempt).await;
            if attempt > 1 {
                self.metrics.lock().record_retry_attempt(started.elapsed());
            }
            match result {
                Ok(value) => {
                    if retried {
                        self.metrics.lock().record_retried_success();
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => match state.next_delay() {
                    RetryDecision::Retry(delay) => {
                        if !retried {
                            retried = true;
                            self.metrics.lock().record_retried_operation();
                        }
                        debug!(
                            session_id,
                            user_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying operation"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        let exhausted = EnsembleError::RetryExhausted {
                            attempts: attempt,
                            last_error: err.to_string(),
                        };
                        self.record_failure(exhausted.kind(), exhausted.to_string());
                        return Err(exhausted);
                    }
                },
                Err(err) => {
                    self.record_failure(err.kind(), err.to_string());
                    return Err(err);
                }
            }
        }
    }

    /// Capture the session's full state as a new snapshot.
    ///
    /// Aged snapshots are evicted afterwards per `max_snapshot_age`.
    pub async fn take_snapshot(&self, session_id: &str) -> Result<()> {
        let snapshot = {
            let sessions = self.sessions.lock();
            let Some(session) = sessions.get(session_id) else {
                let err = EnsembleError::SessionNotFound(session_id.to_string());
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            };
            SessionSnapshot {
                taken_at: Utc::now(),
                collaborators: session
                    .collaborators
                    .iter()
                    .map(|(uid, c)| {
                        (
                            uid.clone(),
                            SnapshotEntry {
                                last_known_state: c.last_known_state.clone(),
                                clock: c.clock.clone(),
                            },
                        )
                    })
                    .collect(),
            }
        };

        self.snapshots.record(session_id, snapshot);
        self.snapshots.cleanup(session_id);
        debug!(
            session_id,
            retained = self.snapshots.count(session_id),
            "snapshot taken"
        );
        Ok(())
    }

    /// Evict snapshots older than the configured maximum age.
    pub fn cleanup_old_snapshots(&self, session_id: &str) -> usize {
        self.snapshots.cleanup(session_id)
    }

    /// Number of retained snapshots for a session.
    #[must_use]
    pub fn snapshot_count(&self, session_id: &str) -> usize {
        self.snapshots.count(session_id)
    }

    /// Restore every collaborator to the latest snapshot.
    ///
    /// Idempotent. With zero snapshots this is a soft failure: the state is
    /// untouched, an error-log entry is recorded, and `Ok` is returned.
    /// Collaborators who joined after the snapshot keep their live state.
    pub async fn recover_state(&self, session_id: &str) -> Result<()> {
        self.metrics.lock().record_recovery_attempt();
        let started = Instant::now();

        {
            let sessions = self.sessions.lock();
            if !sessions.contains_key(session_id) {
                let err = EnsembleError::SessionNotFound(session_id.to_string());
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            }
        }

        let Some(snapshot) = self.snapshots.latest(session_id) else {
            let err = EnsembleError::NoSnapshotAvailable(session_id.to_string());
            warn!(session_id, "recovery requested with no snapshots");
            self.record_failure(err.kind(), err.to_string());
            return Ok(());
        };

        {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                let err = EnsembleError::SessionNotFound(session_id.to_string());
                self.record_failure(err.kind(), err.to_string());
                return Err(err);
            };
            for (uid, entry) in &snapshot.collaborators {
                if let Some(collab) = session.collaborators.get_mut(uid) {
                    collab.last_known_state = entry.last_known_state.clone();
                    collab.clock = entry.clock.clone();
                }
            }
        }

        self.metrics.lock().record_recovery_success(started.elapsed());
        debug!(session_id, "session state recovered from snapshot");
        Ok(())
    }

    /// Refresh a participant's presence timestamp (heartbeat).
    pub fn touch_collaborator(&self, session_id: &str, user_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(collab) = sessions
            .get_mut(session_id)
            .and_then(|s| s.collaborators.get_mut(user_id))
        else {
            return false;
        };
        collab.last_seen = Utc::now();
        true
    }

    /// Participants whose last heartbeat is older than `max_idle`.
    #[must_use]
    pub fn idle_collaborators(&self, session_id: &str, max_idle: Duration) -> Vec<String> {
        let now = Utc::now();
        let sessions = self.sessions.lock();
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };
        session
            .collaborators
            .values()
            .filter(|c| (now - c.last_seen).to_std().unwrap_or(Duration::ZERO) >= max_idle)
            .map(|c| c.user_id.clone())
            .collect()
    }

    #[must_use]
    pub fn get_collaborator_info(&self, user_id: &str, session_id: &str) -> Option<CollaboratorInfo> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|s| s.collaborators.get(user_id))
            .cloned()
    }

    #[must_use]
    pub fn get_all_collaborators(&self, session_id: &str) -> Vec<CollaboratorInfo> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.collaborators.values().cloned().collect())
            .unwrap_or_default()
    }

    /// role name -> holder user id.
    #[must_use]
    pub fn get_role_assignments(&self, session_id: &str) -> HashMap<String, String> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.active_roles.clone())
            .unwrap_or_default()
    }

    /// Register a listener for one event kind. Returns a handle for removal.
    pub fn add_event_listener(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Unregister a listener; returns whether it was present.
    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        list.len() != before
    }

    /// Register a transport sink that receives every event.
    pub fn add_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.lock().push(sink);
    }

    /// Full event history oldest first, optionally filtered by kind.
    #[must_use]
    pub fn get_event_history(&self, kind: Option<EventKind>) -> Vec<SessionEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get_metrics(&self) -> MetricsReport {
        let active_sessions = self.sessions.lock().len();
        self.metrics.lock().report(active_sessions)
    }

    /// Error log oldest first, optionally filtered by kind tag.
    #[must_use]
    pub fn get_error_log(&self, kind: Option<&str>) -> Vec<ErrorLogEntry> {
        self.error_log.lock().entries(kind)
    }

    /// Wipe all sessions, history, snapshots, metrics, and the error log.
    ///
    /// Registered listeners and sinks survive a reset.
    pub fn reset(&self) {
        self.sessions.lock().clear();
        self.history.lock().clear();
        self.snapshots.clear();
        self.metrics.lock().reset();
        self.error_log.lock().clear();
        debug!("session manager reset");
    }

    /// Merge the payload into every listed collaborator's accepted state.
    fn apply_payload(
        &self,
        session_id: &str,
        user_ids: &[String],
        payload: &Value,
        merged_clock: Option<&VectorClock>,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EnsembleError::SessionNotFound(session_id.to_string()))?;
        let now = Utc::now();
        let fields = payload.as_object().cloned().unwrap_or_default();

        for uid in user_ids {
            let Some(collab) = session.collaborators.get_mut(uid) else {
                continue;
            };
            if !collab.last_known_state.is_object() {
                collab.last_known_state = Value::Object(Map::new());
            }
            if let Some(state) = collab.last_known_state.as_object_mut() {
                for (key, value) in &fields {
                    state.insert(key.clone(), value.clone());
                }
                if !state.contains_key("timestamp") {
                    state.insert("timestamp".to_string(), json!(now.timestamp_millis()));
                }
            }
            if let Some(line) = payload.get("current_line").and_then(Value::as_u64) {
                collab.current_line = Some(line);
            }
            if let Some(perf) = payload.get("performance").and_then(Value::as_object) {
                for (key, value) in perf {
                    collab
                        .performance_metrics
                        .insert(key.clone(), value.clone());
                }
            }
            if let Some(clock) = merged_clock {
                collab.clock.merge(clock);
            }
            collab.last_seen = now;
        }
        Ok(())
    }

    /// Append to history and fan out to listeners and sinks, one task each.
    /// A failing callback is logged and never affects the emitting call.
    fn emit(&self, event: SessionEvent) {
        {
            let mut history = self.history.lock();
            let max = self.config.max_events_in_history;
            if max > 0 && history.len() >= max {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let listeners: Vec<EventListener> = self
            .listeners
            .lock()
            .get(&event.kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for listener in listeners {
            let event = event.clone();
            let error_log = Arc::clone(&self.error_log);
            tokio::spawn(async move {
                if let Err(err) = listener(event).await {
                    warn!(error = %err, "event listener failed");
                    error_log.lock().push("listener_failed", err.to_string());
                }
            });
        }

        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.lock().clone();
        for sink in sinks {
            let event = event.clone();
            let error_log = Arc::clone(&self.error_log);
            tokio::spawn(async move {
                if let Err(err) = sink.deliver(event).await {
                    warn!(error = %err, "event sink delivery failed");
                    error_log.lock().push("listener_failed", err.to_string());
                }
            });
        }
    }

    fn record_failure(&self, kind: &str, details: String) {
        self.error_log.lock().push(kind, details);
        self.metrics.lock().record_error();
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn state_event_kind(payload: &Value) -> EventKind {
    if payload.get("emotion").is_some() {
        EventKind::EmotionUpdate
    } else if payload
        .get("line_complete")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        EventKind::LineComplete
    } else {
        EventKind::TimingUpdate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_re_add_updates_username_only() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;
        manager.add_collaborator("u1", "Alicia", "s1").await;

        let info = manager.get_collaborator_info("u1", "s1").unwrap();
        assert_eq!(info.username, "Alicia");
        assert_eq!(manager.get_event_history(Some(EventKind::Join)).len(), 1);
        assert_eq!(manager.get_all_collaborators("s1").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_releases_role() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;
        assert!(manager.assign_role("u1", "narrator", "s1").await);

        manager.remove_collaborator("u1", "s1").await;
        assert!(manager.get_role_assignments("s1").is_empty());
        assert!(manager.get_collaborator_info("u1", "s1").is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;
        manager.remove_collaborator("ghost", "s1").await;
        manager.remove_collaborator("u1", "nope").await;
        assert_eq!(manager.get_all_collaborators("s1").len(), 1);
    }

    #[tokio::test]
    async fn test_assign_role_replaces_previous() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;
        assert!(manager.assign_role("u1", "narrator", "s1").await);
        assert!(manager.assign_role("u1", "director", "s1").await);

        let roles = manager.get_role_assignments("s1");
        assert_eq!(roles.len(), 1);
        assert_eq!(roles["director"], "u1");
        let info = manager.get_collaborator_info("u1", "s1").unwrap();
        assert_eq!(info.role.as_deref(), Some("director"));
    }

    #[tokio::test]
    async fn test_update_state_unknown_session_is_logged() {
        let manager = SessionManager::default();
        let err = manager
            .update_state("missing", "u1", serde_json::json!({"cursor": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::SessionNotFound(_)));

        let log = manager.get_error_log(Some("session_not_found"));
        assert_eq!(log.len(), 1);
        assert_eq!(manager.get_metrics().error_count, 1);
    }

    #[tokio::test]
    async fn test_feedback_requires_both_present() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;

        let err = manager
            .provide_feedback("u1", "u2", serde_json::json!("great pacing"), "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::CollaboratorNotFound { .. }));

        manager.add_collaborator("u2", "Bob", "s1").await;
        manager
            .provide_feedback("u1", "u2", serde_json::json!("great pacing"), "s1")
            .await
            .unwrap();
        assert_eq!(manager.get_event_history(Some(EventKind::Feedback)).len(), 1);
    }

    #[tokio::test]
    async fn test_touch_and_idle() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;

        assert!(manager.touch_collaborator("s1", "u1"));
        assert!(!manager.touch_collaborator("s1", "ghost"));
        assert!(manager
            .idle_collaborators("s1", Duration::from_secs(60))
            .is_empty());
        assert_eq!(
            manager.idle_collaborators("s1", Duration::ZERO),
            vec!["u1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reset_wipes_everything() {
        let manager = SessionManager::default();
        manager.add_collaborator("u1", "Alice", "s1").await;
        manager.take_snapshot("s1").await.unwrap();
        let _ = manager.update_state("missing", "u1", serde_json::json!({})).await;

        manager.reset();
        assert!(manager.get_all_collaborators("s1").is_empty());
        assert!(manager.get_event_history(None).is_empty());
        assert_eq!(manager.snapshot_count("s1"), 0);
        assert!(manager.get_error_log(None).is_empty());
        assert_eq!(manager.get_metrics().error_count, 0);
    }

    #[tokio::test]
    async fn test_history_bound_evicts_oldest_event() {
        let manager = SessionManager::new(EngineConfig {
            max_events_in_history: 2,
            ..Default::default()
        });
        manager.add_collaborator("u1", "Alice", "s1").await;
        manager.add_collaborator("u2", "Bob", "s1").await;
        manager.add_collaborator("u3", "Carol", "s1").await;

        let history = manager.get_event_history(None);
        assert_eq!(history.len(), 2);
        // u1's join was the oldest and must be gone.
        assert_eq!(history[0].user_id, "u2");
        assert_eq!(history[1].user_id, "u3");
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let manager = SessionManager::default();
        let id = manager.add_event_listener(
            EventKind::Join,
            crate::event::listener(|_| async { Ok(()) }),
        );
        assert!(manager.remove_event_listener(EventKind::Join, id));
        assert!(!manager.remove_event_listener(EventKind::Join, id));
    }
}
