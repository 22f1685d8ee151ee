//! Duplicate detection between two playlists.
//!
//! The left side is indexed once (by URI and by normalized signature), then
//! the right side is scanned in order. Runs in O(n + m).

use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::{DuplicateRecord, PlaylistTrackEntry, Track};
use crate::normalize::normalize_signature;
use crate::variation::classify_variation;

// ============================================================================
// Left-side Index
// ============================================================================

/// Arena of left tracks plus URI and signature lookups into it.
/// The signature map keeps the first track seen for each signature.
pub struct LeftIndex<'a> {
    tracks: Vec<&'a Track>,
    by_uri: FxHashMap<&'a str, usize>,
    by_signature: FxHashMap<String, usize>,
}

impl<'a> LeftIndex<'a> {
    pub fn build(entries: &'a [PlaylistTrackEntry]) -> Self {
        let mut index = Self {
            tracks: Vec::with_capacity(entries.len()),
            by_uri: FxHashMap::default(),
            by_signature: FxHashMap::default(),
        };

        for track in entries.iter().filter_map(|e| e.track.as_ref()) {
            let idx = index.tracks.len();
            index.tracks.push(track);
            index.by_uri.insert(track.uri.as_str(), idx);
            index
                .by_signature
                .entry(normalize_signature(track))
                .or_insert(idx);
        }

        index
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.by_uri.contains_key(uri)
    }

    pub fn by_signature(&self, signature: &str) -> Option<&'a Track> {
        self.by_signature.get(signature).map(|&idx| self.tracks[idx])
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Find right-side tracks that also appear on the left, exactly or as a
/// similar variant. Records follow right-side order and each URI appears once.
pub fn find_duplicates(
    left: &[PlaylistTrackEntry],
    right: &[PlaylistTrackEntry],
) -> Vec<DuplicateRecord> {
    let index = LeftIndex::build(left);
    let mut duplicates = Vec::new();
    if index.is_empty() {
        return duplicates;
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();

    for track in right.iter().filter_map(|e| e.track.as_ref()) {
        let uri = track.uri.as_str();
        if seen.contains(uri) {
            continue;
        }

        // Exact URI match takes precedence over signature match
        if index.contains_uri(uri) {
            duplicates.push(DuplicateRecord::exact(track.clone()));
            seen.insert(uri);
            continue;
        }

        let signature = normalize_signature(track);
        if let Some(similar) = index.by_signature(&signature) {
            if similar.uri != uri {
                duplicates.push(DuplicateRecord::similar(
                    track.clone(),
                    classify_variation(&track.name),
                ));
                seen.insert(uri);
            }
        }
    }

    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Album, Artist, Image, MatchType, VariationType};

    fn entry(id: &str, name: &str, artist: &str) -> PlaylistTrackEntry {
        PlaylistTrackEntry::new(Track {
            id: Some(id.to_string()),
            name: name.to_string(),
            uri: format!("spotify:track:{}", id),
            duration_ms: 200_000,
            explicit: false,
            artists: vec![Artist {
                id: Some("artist1".to_string()),
                name: artist.to_string(),
            }],
            album: Album {
                id: Some("album1".to_string()),
                name: "Album Name".to_string(),
                images: vec![Image {
                    url: "https://i.scdn.co/image/album".to_string(),
                }],
            },
        })
    }

    fn uris(records: &[DuplicateRecord]) -> Vec<&str> {
        records.iter().map(|r| r.uri()).collect()
    }

    #[test]
    fn test_exact_match_by_uri() {
        let left = vec![entry("t1", "Song Name", "Artist Name")];
        let right = vec![entry("t1", "Song Name", "Artist Name")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].match_type, MatchType::Exact);
        assert_eq!(dups[0].variation_type, None);
        assert_eq!(dups[0].track.id.as_deref(), Some("t1"));
        assert!(dups[0].in_left && dups[0].in_right);
    }

    #[test]
    fn test_no_match() {
        let left = vec![entry("t1", "Song Name", "Artist Name")];
        let right = vec![entry("t2", "Different Song", "Other Artist")];
        assert!(find_duplicates(&left, &right).is_empty());
    }

    #[test]
    fn test_similar_same_name_and_artist() {
        let left = vec![entry("t1", "Bohemian Rhapsody", "Queen")];
        let right = vec![entry("t2", "Bohemian Rhapsody", "Queen")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].match_type, MatchType::Similar);
        assert_eq!(dups[0].variation_type, None);
    }

    #[test]
    fn test_similar_remastered() {
        let left = vec![entry("t1", "Song Name", "Artist Name")];
        let right = vec![entry("t2", "Song Name (Remastered)", "Artist Name")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].match_type, MatchType::Similar);
        assert_eq!(dups[0].variation_type, Some(VariationType::Remaster));
    }

    #[test]
    fn test_similar_radio_edit() {
        let left = vec![entry("t1", "Song Name", "Artist")];
        let right = vec![entry("t2", "Song Name [Radio Edit]", "Artist")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].match_type, MatchType::Similar);
        assert_eq!(dups[0].variation_type, Some(VariationType::RadioEdit));
    }

    #[test]
    fn test_similar_live() {
        let left = vec![entry("t1", "Hotel California", "Eagles")];
        let right = vec![entry("t2", "Hotel California (Live)", "Eagles")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups[0].variation_type, Some(VariationType::Live));
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let left = vec![
            entry("t1", "SONG NAME", "ARTIST NAME"),
            entry("t3", "Song  Name", "Artist"),
        ];
        let right = vec![
            entry("t2", "song name", "artist name"),
            entry("t4", "Song    Name", "Artist"),
        ];

        let dups = find_duplicates(&left, &right);
        assert_eq!(uris(&dups), vec!["spotify:track:t2", "spotify:track:t4"]);
        assert!(dups.iter().all(|d| d.match_type == MatchType::Similar));
    }

    #[test]
    fn test_different_artist_is_not_similar() {
        let left = vec![entry("t1", "Song Name", "Artist 1")];
        let right = vec![entry("t2", "Song Name", "Artist 2")];
        assert!(find_duplicates(&left, &right).is_empty());
    }

    #[test]
    fn test_empty_sides() {
        let some = vec![entry("t1", "Song", "Artist")];
        assert!(find_duplicates(&[], &[]).is_empty());
        assert!(find_duplicates(&[], &some).is_empty());
        assert!(find_duplicates(&some, &[]).is_empty());
    }

    #[test]
    fn test_skips_null_tracks() {
        let left = vec![PlaylistTrackEntry::tombstone(), entry("t1", "Song", "Artist")];
        let right = vec![
            PlaylistTrackEntry::tombstone(),
            entry("t1", "Song", "Artist"),
            PlaylistTrackEntry::tombstone(),
        ];

        let dups = find_duplicates(&left, &right);
        assert_eq!(uris(&dups), vec!["spotify:track:t1"]);
    }

    #[test]
    fn test_repeated_uri_on_right_reported_once() {
        let left = vec![entry("t1", "Song", "Artist")];
        let right = vec![entry("t1", "Song", "Artist"), entry("t1", "Song", "Artist")];
        assert_eq!(find_duplicates(&left, &right).len(), 1);

        let right_similar = vec![
            entry("t2", "Song (Live)", "Artist"),
            entry("t2", "Song (Live)", "Artist"),
        ];
        assert_eq!(find_duplicates(&left, &right_similar).len(), 1);
    }

    #[test]
    fn test_exact_takes_precedence_over_signature() {
        // t1 is on both sides and also shares a signature with t9 on the left
        let left = vec![entry("t9", "Song", "Artist"), entry("t1", "Song", "Artist")];
        let right = vec![entry("t1", "Song", "Artist")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].match_type, MatchType::Exact);
    }

    #[test]
    fn test_signature_collision_first_seen_wins() {
        // Both left tracks share a signature; the later one is still reachable by URI.
        let left = vec![entry("t1", "Song", "Artist"), entry("t2", "Song (Live)", "Artist")];
        let right = vec![entry("t2", "Song (Live)", "Artist"), entry("t3", "Song [Demo]", "Artist")];

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 2);
        assert_eq!(dups[0].match_type, MatchType::Exact);
        assert_eq!(dups[1].match_type, MatchType::Similar);
        assert_eq!(dups[1].variation_type, Some(VariationType::Demo));

        let index = LeftIndex::build(&left);
        assert_eq!(index.len(), 2);
        assert_eq!(index.by_signature("song|artist").map(|t| t.uri.as_str()), Some("spotify:track:t1"));
    }

    #[test]
    fn test_mix_of_exact_and_similar_in_right_order() {
        let left = vec![
            entry("t1", "Song A", "Artist 1"),
            entry("t2", "Song B", "Artist 2"),
            entry("t3", "Song C", "Artist 3"),
        ];
        let right = vec![
            entry("t5", "Song D", "Artist 4"),
            entry("t4", "Song B (Remastered)", "Artist 2"),
            entry("t1", "Song A", "Artist 1"),
        ];

        let dups = find_duplicates(&left, &right);
        assert_eq!(uris(&dups), vec!["spotify:track:t4", "spotify:track:t1"]);
        assert_eq!(dups[0].match_type, MatchType::Similar);
        assert_eq!(dups[1].match_type, MatchType::Exact);
    }

    #[test]
    fn test_self_comparison_is_all_exact() {
        let tracks: Vec<_> = (0..25)
            .map(|i| entry(&format!("t{}", i), &format!("Song {} (Live)", i), "Artist"))
            .collect();

        let dups = find_duplicates(&tracks, &tracks);
        assert_eq!(dups.len(), tracks.len());
        assert!(dups
            .iter()
            .all(|d| d.match_type == MatchType::Exact && d.variation_type.is_none()));
    }

    #[test]
    fn test_large_overlap_only_exact() {
        let left: Vec<_> = (0..200)
            .map(|i| entry(&format!("l{}", i), &format!("Left Song {}", i), "Artist"))
            .collect();
        let mut right: Vec<_> = left[..50].to_vec();
        right.extend((0..150).map(|i| entry(&format!("r{}", i), &format!("Right Song {}", i), "Other")));

        let dups = find_duplicates(&left, &right);
        assert_eq!(dups.len(), 50);
        assert!(dups.iter().all(|d| d.match_type == MatchType::Exact));
    }

    #[test]
    fn test_output_uris_are_distinct() {
        let left = vec![entry("t1", "Song", "Artist"), entry("t2", "Other", "Artist")];
        let right = vec![
            entry("t3", "Song (Remix)", "Artist"),
            entry("t1", "Song", "Artist"),
            entry("t3", "Song (Remix)", "Artist"),
            entry("t2", "Other", "Artist"),
            entry("t1", "Song", "Artist"),
        ];

        let dups = find_duplicates(&left, &right);
        let distinct: FxHashSet<&str> = dups.iter().map(|d| d.uri()).collect();
        assert_eq!(distinct.len(), dups.len());
        assert_eq!(uris(&dups), vec!["spotify:track:t3", "spotify:track:t1", "spotify:track:t2"]);
    }
}
