//! Song extraction from free-text model replies.
//!
//! Two tiers, first match wins:
//! 1. Exact: the whole reply is one `Title - Artist` line with a single `-`.
//! 2. Relaxed: a `Title - Artist` fragment, optionally quoted, somewhere in
//!    a longer reply. The artist side stops at a newline, comma, or period.

use std::sync::LazyLock;

use regex::Regex;

use cadence_core::types::{MatchTier, SongCandidate};

// =============================================================================
// Compiled regexes (compiled once, reused across calls)
// =============================================================================

static EXACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*"?(?P<title>[^"\-\n]+?)"?\s*-\s*"?(?P<artist>[^"\-\n]+?)"?\s*$"#)
        .expect("Invalid exact song regex")
});

static RELAXED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?(?P<title>[^"\n\-.,:;!?]+?)"?\s*-\s*"?(?P<artist>[^"\n,.]+)"?"#)
        .expect("Invalid relaxed song regex")
});

/// Characters stripped from both ends of each captured side.
const EDGE_CHARS: &[char] = &['"', '`', '*', ' ', '\t'];

/// A candidate plus the tier that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSong {
    pub candidate: SongCandidate,
    pub tier: MatchTier,
}

/// Pattern-based `Title - Artist` extractor. Never fails; unparseable text
/// yields `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SongExtractor;

impl SongExtractor {
    pub fn extract(&self, text: &str) -> Option<ExtractedSong> {
        if let Some(candidate) = EXACT_RE.captures(text).and_then(|c| candidate_from(&c)) {
            return Some(ExtractedSong {
                candidate,
                tier: MatchTier::Exact,
            });
        }

        RELAXED_RE
            .captures_iter(text)
            .find_map(|c| candidate_from(&c))
            .map(|candidate| ExtractedSong {
                candidate,
                tier: MatchTier::Relaxed,
            })
    }
}

fn candidate_from(caps: &regex::Captures<'_>) -> Option<SongCandidate> {
    let title = caps.name("title")?.as_str().trim_matches(EDGE_CHARS).trim();
    let artist = caps.name("artist")?.as_str().trim_matches(EDGE_CHARS).trim();
    if title.is_empty() || artist.is_empty() {
        return None;
    }
    Some(SongCandidate::new(title, artist))
}
