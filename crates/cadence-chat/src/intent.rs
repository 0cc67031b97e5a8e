//! Intent routing and system-instruction selection.
//!
//! Matching is plain case-insensitive substring containment. The song-or-chat
//! branch relies on this looseness: anything that is not a replay or detail
//! request goes to the model with the strict `Title - Artist` instruction.

use cadence_core::types::Intent;

/// Phrases that ask to hear the last resolved song again.
const REPLAY_PHRASES: &[&str] = &["play previous song", "previous song", "last song"];

/// Phrases that ask for information rather than a song.
const DETAIL_KEYWORDS: &[&str] = &["detail", "info", "tell me about"];

/// System instruction used when the user wants details.
pub const DETAIL_INSTRUCTION: &str = "You are a Music Bot. The user wants details about a \
song, artist, or album. Give a brief, accurate, informative answer in a few sentences.";

/// System instruction used for everything else.
pub const SONG_OR_CHAT_INSTRUCTION: &str = "You are a Music Bot. If the user asks for a song \
or a recommendation, reply with exactly one line in the format `Title - Artist` and nothing \
else. Otherwise, chat briefly and naturally about music.";

/// Reply when a replay is requested before any song was resolved.
pub const NO_PREVIOUS_SONG: &str =
    "I don't have a previous song to play yet. Ask me for a song first!";

/// Classifies utterances and picks the matching system instruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentRouter;

impl IntentRouter {
    /// Route an utterance. Replay wins over detail.
    pub fn classify(&self, utterance: &str) -> Intent {
        let lower = utterance.to_lowercase();
        if REPLAY_PHRASES.iter().any(|p| lower.contains(p)) {
            Intent::Replay
        } else if DETAIL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Intent::Detail
        } else {
            Intent::Generic
        }
    }

    /// System instruction for a model-backed intent. Replay never reaches the
    /// model; it maps to the general instruction for completeness.
    pub fn system_instruction(&self, intent: Intent) -> &'static str {
        match intent {
            Intent::Detail => DETAIL_INSTRUCTION,
            Intent::Generic | Intent::Replay => SONG_OR_CHAT_INSTRUCTION,
        }
    }
}

/// Confirmation text for a replayed track.
pub fn replay_message(label: &str) -> String {
    format!("Playing the last song again: {}", label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_phrases() {
        let router = IntentRouter;
        assert_eq!(router.classify("play previous song"), Intent::Replay);
        assert_eq!(router.classify("Can you play the LAST SONG?"), Intent::Replay);
        assert_eq!(router.classify("that previous song was great"), Intent::Replay);
    }

    #[test]
    fn test_detail_keywords() {
        let router = IntentRouter;
        assert_eq!(router.classify("Tell me about Radiohead"), Intent::Detail);
        assert_eq!(router.classify("more info on this album"), Intent::Detail);
        assert_eq!(router.classify("Details please"), Intent::Detail);
    }

    #[test]
    fn test_replay_beats_detail() {
        let router = IntentRouter;
        assert_eq!(
            router.classify("tell me about the last song"),
            Intent::Replay
        );
    }

    #[test]
    fn test_generic_fallthrough() {
        let router = IntentRouter;
        assert_eq!(router.classify("recommend something upbeat"), Intent::Generic);
        assert_eq!(router.classify(""), Intent::Generic);
    }

    #[test]
    fn test_loose_containment_is_preserved() {
        // "information" contains "info"; substring matching is intentional.
        assert_eq!(IntentRouter.classify("any information?"), Intent::Detail);
    }

    #[test]
    fn test_system_instruction_selection() {
        let router = IntentRouter;
        assert_eq!(router.system_instruction(Intent::Detail), DETAIL_INSTRUCTION);
        assert_eq!(
            router.system_instruction(Intent::Generic),
            SONG_OR_CHAT_INSTRUCTION
        );
        assert!(SONG_OR_CHAT_INSTRUCTION.contains("Title - Artist"));
    }

    #[test]
    fn test_replay_message() {
        assert_eq!(
            replay_message("Yesterday by The Beatles"),
            "Playing the last song again: Yesterday by The Beatles"
        );
    }
}
