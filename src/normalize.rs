//! Track signature normalization for similar-match detection.
//!
//! A signature is `"<cleaned name>|<primary artist>"`. Two tracks whose
//! names differ only by case, whitespace or parenthesized/bracketed
//! qualifiers share a signature.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Track;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Qualifier groups stripped from names, with surrounding whitespace:
/// "(Remastered)", "(feat. X)", "[Radio Edit]".
pub static QUALIFIER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\s*\(.*?\)\s*").unwrap(),
        Regex::new(r"\s*\[.*?\]\s*").unwrap(),
    ]
});

/// Runs of whitespace, collapsed to a single space
pub static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Bucket for tracks without a usable primary artist
pub const UNKNOWN_ARTIST: &str = "unknown";

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Lower-case a name and strip qualifier groups.
/// e.g., "Song Name (Remastered 2011) [Mono]" → "song name"
pub fn clean_name(name: &str) -> String {
    let mut result = name.trim().to_lowercase();
    for pattern in QUALIFIER_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }
    WHITESPACE_RUN.replace_all(&result, " ").trim().to_string()
}

/// Lower-cased, trimmed primary artist, or `unknown` when missing or blank.
pub fn primary_artist_key(track: &Track) -> String {
    match track.primary_artist().map(|a| a.trim().to_lowercase()) {
        Some(artist) if !artist.is_empty() => artist,
        _ => UNKNOWN_ARTIST.to_string(),
    }
}

/// Canonical comparison key for a track. Total: never fails.
pub fn normalize_signature(track: &Track) -> String {
    format!("{}|{}", clean_name(&track.name), primary_artist_key(track))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artist;

    fn track(name: &str, artists: &[&str]) -> Track {
        Track {
            name: name.to_string(),
            uri: "spotify:track:x".to_string(),
            artists: artists
                .iter()
                .map(|a| Artist {
                    id: None,
                    name: a.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_signature_basic() {
        assert_eq!(
            normalize_signature(&track("Bohemian Rhapsody", &["Queen"])),
            "bohemian rhapsody|queen"
        );
        assert_eq!(
            normalize_signature(&track("  Song Name ", &[" Artist Name  "])),
            "song name|artist name"
        );
    }

    #[test]
    fn test_strips_qualifiers() {
        assert_eq!(clean_name("Song Name (Remastered)"), "song name");
        assert_eq!(clean_name("Song Name [Radio Edit]"), "song name");
        assert_eq!(clean_name("Song Name (feat. Other Artist)"), "song name");
        assert_eq!(clean_name("Song (Live) [2011 Remaster] (Mono)"), "song");
    }

    #[test]
    fn test_qualifier_consumes_surrounding_whitespace() {
        // The group and the spaces around it are removed together.
        assert_eq!(clean_name("Song (feat. X) Remix"), "songremix");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(clean_name("Song    Name"), "song name");
        assert_eq!(clean_name("Song \t Name"), "song name");
    }

    #[test]
    fn test_missing_artist_falls_back_to_unknown() {
        assert_eq!(normalize_signature(&track("Song", &[])), "song|unknown");
        assert_eq!(normalize_signature(&track("Song", &["   "])), "song|unknown");
    }

    #[test]
    fn test_only_primary_artist_counts() {
        assert_eq!(
            normalize_signature(&track("Song", &["Main", "Guest"])),
            normalize_signature(&track("Song", &["Main"]))
        );
    }

    #[test]
    fn test_case_and_qualifier_invariance() {
        let base = normalize_signature(&track("Hotel California", &["Eagles"]));
        for name in [
            "HOTEL CALIFORNIA",
            "hotel california",
            "Hotel California (Live)",
            "Hotel California [Remastered]",
            "Hotel California (2013 Remaster)",
        ] {
            assert_eq!(normalize_signature(&track(name, &["EAGLES"])), base, "{}", name);
        }
    }
}
