use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the running conversation. Never edited after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Speaker,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// The behaviour a user utterance is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Replay the most recently resolved track without consulting the model.
    Replay,
    /// Ask the model for details about a song, artist, or album.
    Detail,
    /// Song request or free conversation.
    Generic,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Replay => "replay",
            Intent::Detail => "detail",
            Intent::Generic => "generic",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Songs and tracks
// =============================================================================

/// Which extraction rule produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// The whole reply is a `Title - Artist` line.
    Exact,
    /// A `Title - Artist` fragment was found inside a longer reply.
    Relaxed,
}

/// A song named by the model, not yet confirmed against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCandidate {
    pub title: String,
    pub artist: String,
}

impl SongCandidate {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Display label, `"Title by Artist"` (or just the title without an artist).
    pub fn label(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} by {}", self.title, self.artist)
        }
    }
}

/// Public web player prefix for a catalog track id.
pub const TRACK_URL_BASE: &str = "https://open.spotify.com/track/";

/// Embeddable player prefix for a catalog track id.
pub const EMBED_URL_BASE: &str = "https://open.spotify.com/embed/track/";

/// A candidate after catalog lookup.
///
/// Serialized with the wire names the chat front-end renders:
/// `{ "song", "link", "iframe" }`. `link` and `iframe` are either both set
/// or both null; the constructors are the only way to build one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedTrack {
    #[serde(rename = "song")]
    label: String,
    #[serde(rename = "link")]
    external_link: Option<String>,
    #[serde(rename = "iframe")]
    embed_markup: Option<String>,
}

impl ResolvedTrack {
    /// Build a playable track from a catalog track id.
    pub fn from_track_id(label: impl Into<String>, track_id: &str) -> Self {
        Self {
            label: label.into(),
            external_link: Some(format!("{TRACK_URL_BASE}{track_id}")),
            embed_markup: Some(format!(
                "<iframe src=\"{EMBED_URL_BASE}{track_id}\" width=\"300\" height=\"80\" \
                 frameborder=\"0\" allowtransparency=\"true\" allow=\"encrypted-media\"></iframe>"
            )),
        }
    }

    /// A track whose lookup failed or found nothing.
    pub fn unresolved(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            external_link: None,
            embed_markup: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn external_link(&self) -> Option<&str> {
        self.external_link.as_deref()
    }

    pub fn embed_markup(&self) -> Option<&str> {
        self.embed_markup.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.external_link.is_some()
    }
}
