use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{Intent, MatchTier, Timestamp};

/// All domain events that can occur while serving conversation turns.
///
/// Substitution points (model fallback, unresolved track) each have their own
/// variant so consumers can tell a degraded turn from a normal one.
/// Events are consumed by:
/// - The SSE broadcast channel (for live operator views)
/// - Tests that assert which path a turn took
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Turn Events
    // =========================================================================
    /// A turn was accepted and routed.
    TurnStarted {
        session_id: Uuid,
        intent: Intent,
        timestamp: Timestamp,
    },

    /// The language model failed and the fallback reply was used instead.
    ModelFallback { reason: String, timestamp: Timestamp },

    /// The model reply named a song.
    CandidateExtracted {
        title: String,
        artist: String,
        tier: MatchTier,
        timestamp: Timestamp,
    },

    /// The model reply did not name a song; resolution was skipped.
    NoCandidateExtracted { timestamp: Timestamp },

    /// A replay request was answered from track history.
    ReplayServed { label: String, timestamp: Timestamp },

    /// A replay request arrived with an empty track history.
    ReplayUnavailable { timestamp: Timestamp },

    // =========================================================================
    // Catalog Events
    // =========================================================================
    /// A catalog bearer token was obtained.
    TokenAcquired { reused: bool, timestamp: Timestamp },

    /// A candidate was matched to a catalog track.
    TrackResolved {
        label: String,
        track_id: String,
        timestamp: Timestamp,
    },

    /// A candidate could not be matched; a null-link track was substituted.
    TrackUnresolved {
        label: String,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Session Events
    // =========================================================================
    /// An idle session passed its timeout and was dropped.
    SessionExpired {
        session_id: Uuid,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::TurnStarted { timestamp, .. }
            | DomainEvent::ModelFallback { timestamp, .. }
            | DomainEvent::CandidateExtracted { timestamp, .. }
            | DomainEvent::NoCandidateExtracted { timestamp }
            | DomainEvent::ReplayServed { timestamp, .. }
            | DomainEvent::ReplayUnavailable { timestamp }
            | DomainEvent::TokenAcquired { timestamp, .. }
            | DomainEvent::TrackResolved { timestamp, .. }
            | DomainEvent::TrackUnresolved { timestamp, .. }
            | DomainEvent::SessionExpired { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging and SSE.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::TurnStarted { .. } => "turn_started",
            DomainEvent::ModelFallback { .. } => "model_fallback",
            DomainEvent::CandidateExtracted { .. } => "candidate_extracted",
            DomainEvent::NoCandidateExtracted { .. } => "no_candidate_extracted",
            DomainEvent::ReplayServed { .. } => "replay_served",
            DomainEvent::ReplayUnavailable { .. } => "replay_unavailable",
            DomainEvent::TokenAcquired { .. } => "token_acquired",
            DomainEvent::TrackResolved { .. } => "track_resolved",
            DomainEvent::TrackUnresolved { .. } => "track_unresolved",
            DomainEvent::SessionExpired { .. } => "session_expired",
        }
    }

    /// True for events that mark a silent substitution.
    pub fn is_substitution(&self) -> bool {
        matches!(
            self,
            DomainEvent::ModelFallback { .. } | DomainEvent::TrackUnresolved { .. }
        )
    }
}

/// Fan-out channel for [`DomainEvent`]s.
///
/// Cloning is cheap; every clone publishes into the same channel. Publishing
/// while nobody is subscribed drops the event.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        if event.is_substitution() {
            tracing::info!(event = event.event_name(), "substitution event");
        } else {
            tracing::debug!(event = event.event_name(), "domain event");
        }
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}
