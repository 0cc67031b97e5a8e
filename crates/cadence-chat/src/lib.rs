//! Conversational core for Cadence.
//!
//! Routes each user utterance, consults the language model, extracts a song
//! from the reply, resolves it against the music catalog, and keeps bounded
//! per-session history.

pub mod catalog;
pub mod error;
pub mod extractor;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use catalog::{CatalogResolver, SpotifyCatalog, TokenCache, TrackCatalog};
pub use error::ChatError;
pub use extractor::{ExtractedSong, SongExtractor};
pub use intent::IntentRouter;
pub use llm::{Completion, CompletionSource, LanguageModel, ModelClient, OpenAiChatModel};
pub use orchestrator::TurnOrchestrator;
pub use session::{BoundedHistory, SessionState, SessionStore, DEFAULT_SESSION_ID};
pub use types::{TurnRequest, TurnResponse};
