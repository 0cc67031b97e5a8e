//! Session state: bounded conversation and track history, keyed by session.
//!
//! Each session's state sits behind its own async mutex that a turn holds
//! from routing to response, so turns within one session never interleave.
//! The outer map is only locked briefly to look up or create a slot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use cadence_core::config::SessionConfig;
use cadence_core::events::{DomainEvent, EventBus};
use cadence_core::types::{ChatTurn, ResolvedTrack, Timestamp};

use crate::error::ChatError;

/// Session used when a request carries no session id.
pub const DEFAULT_SESSION_ID: Uuid = Uuid::nil();

// =============================================================================
// BoundedHistory
// =============================================================================

/// FIFO sequence capped at a fixed capacity; the oldest entry is evicted
/// in the same call that would overflow it.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning whatever had to be evicted.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

// =============================================================================
// SessionState
// =============================================================================

/// Conversation and resolved-track history for one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    history: BoundedHistory<ChatTurn>,
    tracks: BoundedHistory<ResolvedTrack>,
}

impl SessionState {
    pub fn new(history_capacity: usize, track_capacity: usize) -> Self {
        Self {
            history: BoundedHistory::new(history_capacity),
            tracks: BoundedHistory::new(track_capacity),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.history.push(ChatTurn::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ChatTurn::assistant(text));
    }

    /// Record a resolved track. Tracks without a link are not kept, so
    /// [`SessionState::last_track`] only ever returns playable ones.
    pub fn append_track(&mut self, track: ResolvedTrack) -> bool {
        if !track.is_resolved() {
            return false;
        }
        self.tracks.push(track);
        true
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.history.to_vec()
    }

    pub fn tracks(&self) -> Vec<ResolvedTrack> {
        self.tracks.to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn last_track(&self) -> Option<&ResolvedTrack> {
        self.tracks.last()
    }
}

// =============================================================================
// SessionStore
// =============================================================================

struct SessionSlot {
    state: Arc<AsyncMutex<SessionState>>,
    last_seen: Timestamp,
}

/// In-memory map of session id to state, with idle-timeout eviction.
///
/// Expired sessions are dropped lazily whenever a session is acquired, and
/// by [`SessionStore::expire_idle`] if the host runs a periodic sweep.
/// A session with a turn in flight is never expired.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SessionSlot>>,
    history_capacity: usize,
    track_capacity: usize,
    timeout_secs: u64,
    events: EventBus,
}

impl SessionStore {
    pub fn new(config: &SessionConfig, events: EventBus) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_capacity: config.history_capacity,
            track_capacity: config.track_capacity,
            timeout_secs: u64::from(config.session_timeout_minutes) * 60,
            events,
        }
    }

    /// Get the state for `requested` (or the default session), creating it
    /// if it does not exist or has expired.
    pub fn acquire(
        &self,
        requested: Option<Uuid>,
    ) -> Result<(Uuid, Arc<AsyncMutex<SessionState>>), ChatError> {
        let sid = requested.unwrap_or(DEFAULT_SESSION_ID);
        let now = Timestamp::now();

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::State(format!("session lock poisoned: {}", e)))?;
        self.sweep(&mut sessions, now);

        let slot = sessions.entry(sid).or_insert_with(|| {
            tracing::debug!(session_id = %sid, "creating session");
            SessionSlot {
                state: Arc::new(AsyncMutex::new(SessionState::new(
                    self.history_capacity,
                    self.track_capacity,
                ))),
                last_seen: now,
            }
        });
        slot.last_seen = now;
        Ok((sid, Arc::clone(&slot.state)))
    }

    /// Look up an existing session without creating or touching it.
    pub fn get(&self, session_id: Uuid) -> Option<Arc<AsyncMutex<SessionState>>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(&session_id).map(|slot| Arc::clone(&slot.state)))
    }

    /// Delete a session by id.
    pub fn remove(&self, session_id: Uuid) -> Result<(), ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::State(format!("session lock poisoned: {}", e)))?;
        match sessions.remove(&session_id) {
            Some(_) => Ok(()),
            None => Err(ChatError::SessionNotFound(session_id)),
        }
    }

    /// Mark a session as active at `now`. Unknown ids are ignored.
    pub fn touch(&self, session_id: Uuid, now: Timestamp) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(slot) = sessions.get_mut(&session_id) {
                slot.last_seen = now;
            }
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session idle since before `now - timeout`. Returns how many.
    pub fn expire_idle(&self, now: Timestamp) -> usize {
        match self.sessions.lock() {
            Ok(mut sessions) => self.sweep(&mut sessions, now),
            Err(e) => {
                tracing::error!("Session lock poisoned: {}", e);
                0
            }
        }
    }

    fn sweep(&self, sessions: &mut HashMap<Uuid, SessionSlot>, now: Timestamp) -> usize {
        if self.timeout_secs == 0 {
            return 0;
        }
        let timeout = self.timeout_secs as i64;
        let expired: Vec<Uuid> = sessions
            .iter()
            // A turn in flight holds a clone of the state; never sweep under it.
            .filter(|(_, slot)| Arc::strong_count(&slot.state) == 1)
            .filter(|(_, slot)| now.0 - slot.last_seen.0 > timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "session expired");
            self.events.publish(DomainEvent::SessionExpired {
                session_id: *id,
                timestamp: now,
            });
        }
        expired.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(history: usize, tracks: usize, timeout_minutes: u32) -> SessionStore {
        let config = SessionConfig {
            history_capacity: history,
            track_capacity: tracks,
            session_timeout_minutes: timeout_minutes,
            ..SessionConfig::default()
        };
        SessionStore::new(&config, EventBus::default())
    }

    // -- BoundedHistory --

    #[test]
    fn test_bounded_history_evicts_oldest_first() {
        let mut h = BoundedHistory::new(3);
        assert_eq!(h.push(1), None);
        assert_eq!(h.push(2), None);
        assert_eq!(h.push(3), None);
        assert_eq!(h.push(4), Some(1));
        assert_eq!(h.to_vec(), vec![2, 3, 4]);
        assert_eq!(h.last(), Some(&4));
    }

    #[test]
    fn test_bounded_history_never_exceeds_capacity() {
        let mut h = BoundedHistory::new(10);
        for i in 0..100 {
            h.push(i);
            assert!(h.len() <= h.capacity());
        }
        assert_eq!(h.iter().next(), Some(&90));
    }

    #[test]
    fn test_bounded_history_zero_capacity_keeps_nothing() {
        let mut h = BoundedHistory::new(0);
        assert_eq!(h.push("a"), Some("a"));
        assert!(h.is_empty());
        assert_eq!(h.last(), None);
    }

    // -- SessionState --

    #[test]
    fn test_state_history_is_capped_at_ten() {
        let mut state = SessionState::new(10, 10);
        for i in 0..12 {
            state.append_user(format!("u{}", i));
            state.append_assistant(format!("a{}", i));
        }
        let history = state.history();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0], ChatTurn::user("u7"));
        assert_eq!(history[9], ChatTurn::assistant("a11"));
    }

    #[test]
    fn test_state_only_keeps_resolved_tracks() {
        let mut state = SessionState::new(10, 10);
        assert!(state.last_track().is_none());

        assert!(state.append_track(ResolvedTrack::from_track_id("A by B", "id1")));
        assert!(!state.append_track(ResolvedTrack::unresolved("C by D")));

        assert_eq!(state.track_count(), 1);
        assert_eq!(state.last_track().unwrap().label(), "A by B");
    }

    #[test]
    fn test_state_track_history_capped_and_all_linked() {
        let mut state = SessionState::new(10, 10);
        for i in 0..15 {
            state.append_track(ResolvedTrack::from_track_id(format!("S{}", i), &i.to_string()));
            state.append_track(ResolvedTrack::unresolved("x"));
        }
        let tracks = state.tracks();
        assert_eq!(tracks.len(), 10);
        assert!(tracks.iter().all(|t| t.external_link().is_some()));
        assert_eq!(state.last_track().unwrap().label(), "S14");
    }

    // -- SessionStore --

    #[test]
    fn test_acquire_without_id_uses_default_session() {
        let store = store_with(10, 10, 60);
        let (sid, _) = store.acquire(None).unwrap();
        assert_eq!(sid, DEFAULT_SESSION_ID);
        let (again, _) = store.acquire(None).unwrap();
        assert_eq!(again, sid);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_returns_same_state_for_same_id() {
        let store = store_with(10, 10, 60);
        let id = Uuid::new_v4();

        let (_, state) = store.acquire(Some(id)).unwrap();
        state.lock().await.append_user("hello");

        let (_, state) = store.acquire(Some(id)).unwrap();
        assert_eq!(state.lock().await.history_len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = store_with(10, 10, 60);
        let (_, a) = store.acquire(Some(Uuid::new_v4())).unwrap();
        let (_, b) = store.acquire(Some(Uuid::new_v4())).unwrap();

        a.lock().await.append_user("only in a");
        assert_eq!(b.lock().await.history_len(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_does_not_create() {
        let store = store_with(10, 10, 60);
        assert!(store.get(Uuid::new_v4()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_session() {
        let store = store_with(10, 10, 60);
        let id = Uuid::new_v4();
        store.acquire(Some(id)).unwrap();
        assert!(store.remove(id).is_ok());
        assert!(matches!(store.remove(id), Err(ChatError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_expire_idle_drops_old_sessions_and_emits_event() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let config = SessionConfig {
            session_timeout_minutes: 1,
            ..SessionConfig::default()
        };
        let store = SessionStore::new(&config, events);
        let id = Uuid::new_v4();
        store.acquire(Some(id)).unwrap();

        assert_eq!(store.expire_idle(Timestamp::now()), 0);
        let later = Timestamp(Timestamp::now().0 + 120);
        assert_eq!(store.expire_idle(later), 1);
        assert!(store.get(id).is_none());

        match rx.recv().await.unwrap() {
            DomainEvent::SessionExpired { session_id, .. } => assert_eq!(session_id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let store = store_with(10, 10, 0);
        store.acquire(None).unwrap();
        assert_eq!(store.expire_idle(Timestamp(i64::MAX / 2)), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_touch_keeps_session_alive() {
        let store = store_with(10, 10, 1);
        let id = Uuid::new_v4();
        store.acquire(Some(id)).unwrap();

        let now = Timestamp::now();
        store.touch(id, Timestamp(now.0 + 100));
        assert_eq!(store.expire_idle(Timestamp(now.0 + 130)), 0);
        assert_eq!(store.expire_idle(Timestamp(now.0 + 200)), 1);

        // Unknown ids are a no-op.
        store.touch(Uuid::new_v4(), now);
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_with_turn_in_flight_is_not_expired() {
        let store = store_with(10, 10, 1);
        let id = Uuid::new_v4();
        let (_, held) = store.acquire(Some(id)).unwrap();

        let later = Timestamp(Timestamp::now().0 + 600);
        assert_eq!(store.expire_idle(later), 0);
        assert!(store.get(id).is_some());

        drop(held);
        assert_eq!(store.expire_idle(later), 1);
    }
}
