//! Turn orchestrator: routes an utterance, drives the model, extractor and
//! catalog, and updates session state.
//!
//! The session lock is only held for in-memory steps: appending the user
//! turn, the replay decision, the history snapshot, and PERSIST. Network
//! calls run unlocked, so a hung upstream call stalls only its own turn.

use std::sync::Arc;

use uuid::Uuid;

use cadence_core::config::SessionConfig;
use cadence_core::events::{DomainEvent, EventBus};
use cadence_core::types::{ChatTurn, Intent, ResolvedTrack, Timestamp};

use crate::catalog::{CatalogResolver, TrackCatalog};
use crate::error::ChatError;
use crate::extractor::SongExtractor;
use crate::intent::{replay_message, IntentRouter, NO_PREVIOUS_SONG};
use crate::llm::{LanguageModel, ModelClient};
use crate::session::{SessionState, SessionStore};
use crate::types::{SessionSnapshot, TurnRequest, TurnResponse};

/// Per-turn state machine over a shared [`SessionStore`].
pub struct TurnOrchestrator {
    sessions: SessionStore,
    router: IntentRouter,
    model: ModelClient,
    extractor: SongExtractor,
    resolver: CatalogResolver,
    events: EventBus,
}

impl TurnOrchestrator {
    pub fn new(
        config: &SessionConfig,
        model: Arc<dyn LanguageModel>,
        catalog: Arc<dyn TrackCatalog>,
        events: EventBus,
    ) -> Self {
        Self {
            sessions: SessionStore::new(config, events.clone()),
            router: IntentRouter,
            model: ModelClient::new(model, events.clone()),
            extractor: SongExtractor,
            resolver: CatalogResolver::new(catalog, events.clone()),
            events,
        }
    }

    /// Handle one turn.
    ///
    /// Any utterance, including an empty one, yields a reply. Upstream
    /// failures surface as fallback text or null-link tracks; only session
    /// bookkeeping can fail.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, ChatError> {
        let message = request.user_message;
        let (sid, slot) = self.sessions.acquire(request.session_id)?;

        let intent = self.router.classify(&message);
        tracing::debug!(session_id = %sid, intent = %intent, "turn started");

        let history = {
            let mut state = slot.lock().await;
            state.append_user(message.as_str());
            self.events.publish(DomainEvent::TurnStarted {
                session_id: sid,
                intent,
                timestamp: Timestamp::now(),
            });
            if intent == Intent::Replay {
                return Ok(self.replay(sid, &message, &state));
            }
            state.history()
        };

        let (content, tracks) = self.generate(intent, &history).await;

        // PERSIST
        {
            let mut state = slot.lock().await;
            state.append_assistant(content.as_str());
            for track in &tracks {
                state.append_track(track.clone());
            }
        }
        self.sessions.touch(sid, Timestamp::now());

        Ok(TurnResponse::new(sid, message, content, tracks))
    }

    /// Terminal replay state. Never calls the model.
    fn replay(&self, sid: Uuid, message: &str, state: &SessionState) -> TurnResponse {
        match state.last_track() {
            Some(track) => {
                self.events.publish(DomainEvent::ReplayServed {
                    label: track.label().to_string(),
                    timestamp: Timestamp::now(),
                });
                TurnResponse::new(
                    sid,
                    message,
                    replay_message(track.label()),
                    vec![track.clone()],
                )
            }
            None => {
                self.events.publish(DomainEvent::ReplayUnavailable {
                    timestamp: Timestamp::now(),
                });
                TurnResponse::new(sid, message, NO_PREVIOUS_SONG, Vec::new())
            }
        }
    }

    /// GENERATE, EXTRACT and RESOLVE. Touches no session state.
    async fn generate(
        &self,
        intent: Intent,
        history: &[ChatTurn],
    ) -> (String, Vec<ResolvedTrack>) {
        let instruction = self.router.system_instruction(intent);
        let completion = self.model.complete(instruction, history).await;

        let candidates = match self.extractor.extract(&completion.content) {
            Some(found) => {
                self.events.publish(DomainEvent::CandidateExtracted {
                    title: found.candidate.title.clone(),
                    artist: found.candidate.artist.clone(),
                    tier: found.tier,
                    timestamp: Timestamp::now(),
                });
                vec![found.candidate]
            }
            None => {
                self.events.publish(DomainEvent::NoCandidateExtracted {
                    timestamp: Timestamp::now(),
                });
                Vec::new()
            }
        };

        let tracks = self.resolver.resolve_all(&candidates).await;
        (completion.content, tracks)
    }

    /// Snapshot of a session's history and tracks.
    pub async fn history(&self, session_id: Uuid) -> Result<SessionSnapshot, ChatError> {
        let slot = self
            .sessions
            .get(session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        let state = slot.lock().await;
        Ok(SessionSnapshot {
            session_id,
            history: state.history(),
            tracks: state.tracks(),
        })
    }

    pub fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.sessions.remove(session_id)?;
        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drop idle sessions. Returns how many were removed.
    pub fn expire_idle(&self) -> usize {
        self.sessions.expire_idle(Timestamp::now())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
