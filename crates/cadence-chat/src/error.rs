//! Error types for the conversational core.
//!
//! Upstream variants never reach the HTTP caller: the component that hits
//! them converts them into a substitute value and emits a domain event.

use uuid::Uuid;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("upstream auth failure: {0}")]
    UpstreamAuthFailure(String),
    #[error("upstream request failure: {0}")]
    UpstreamRequestFailure(String),
    #[error("no catalog match for: {0}")]
    NoMatchFound(String),
    #[error("session state error: {0}")]
    State(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(
            ChatError::MissingCredential("OPENAI_API_KEY").to_string(),
            "missing credential: OPENAI_API_KEY"
        );
        assert_eq!(
            ChatError::UpstreamAuthFailure("HTTP 400".into()).to_string(),
            "upstream auth failure: HTTP 400"
        );
        assert_eq!(
            ChatError::UpstreamRequestFailure("timeout".into()).to_string(),
            "upstream request failure: timeout"
        );
        assert_eq!(
            ChatError::NoMatchFound("Yesterday".into()).to_string(),
            "no catalog match for: Yesterday"
        );
    }

    #[test]
    fn test_session_not_found_preserves_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            ChatError::SessionNotFound(id).to_string(),
            "session not found: 550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
