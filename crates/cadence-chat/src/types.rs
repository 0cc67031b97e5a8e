//! Request and response envelopes for a single turn.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::types::{ChatTurn, ResolvedTrack, Speaker};

/// Inbound turn from the chat front-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub user_message: String,
    /// Omitted by single-user front-ends; those share the default session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl TurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// The assistant's reply envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// Always [`Speaker::Assistant`].
    pub role: Speaker,
    pub content: String,
    /// Echo of the inbound utterance.
    pub user_message: String,
    pub spotify_links: Vec<ResolvedTrack>,
    pub session_id: Uuid,
}

impl TurnResponse {
    pub fn new(
        session_id: Uuid,
        user_message: impl Into<String>,
        content: impl Into<String>,
        spotify_links: Vec<ResolvedTrack>,
    ) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
            user_message: user_message.into(),
            spotify_links,
            session_id,
        }
    }
}

/// Read-only copy of one session's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub history: Vec<ChatTurn>,
    pub tracks: Vec<ResolvedTrack>,
}
