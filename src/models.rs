//! Core data models for playlist comparison.
//!
//! This module contains the service-facing track and playlist shapes, plus
//! the derived duplicate records and discriminants used throughout the
//! comparison pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Service Models
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A playable item as returned by the music service.
/// `uri` is the stable identifier; `id` is null for local files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Album,
}

impl Track {
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }

    /// Duration as `m:ss`
    pub fn formatted_duration(&self) -> String {
        let minutes = self.duration_ms / 60_000;
        let seconds = (self.duration_ms % 60_000) / 1000;
        format!("{}:{:02}", minutes, seconds)
    }
}

/// One row of a playlist. `track` is null for tombstoned items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTrackEntry {
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub track: Option<Track>,
}

impl PlaylistTrackEntry {
    pub fn new(track: Track) -> Self {
        Self {
            added_at: None,
            track: Some(track),
        }
    }

    pub fn tombstone() -> Self {
        Self::default()
    }
}

/// Full track listing of a playlist after all pages were fetched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTracks {
    pub items: Vec<PlaylistTrackEntry>,
    pub total: usize,
}

/// Page envelope used by every list endpoint of the service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub total: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCount {
    pub total: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub tracks: TrackCount,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub snapshot_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Response body of a track removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
}

// ============================================================================
// Comparison Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Same track identifier on both sides
    Exact,
    /// Different identifiers, identical normalized signature
    Similar,
}

/// Qualifier of a near-duplicate track. Absence of a qualifier is `None`
/// at the use site (`Option<VariationType>`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum VariationType {
    Live,
    Remix,
    Remaster,
    Acoustic,
    Instrumental,
    RadioEdit,
    Extended,
    Demo,
    Other,
}

impl VariationType {
    pub fn label(self) -> &'static str {
        match self {
            VariationType::Live => "Live",
            VariationType::Remix => "Remix",
            VariationType::Remaster => "Remaster",
            VariationType::Acoustic => "Acoustic",
            VariationType::Instrumental => "Instrumental",
            VariationType::RadioEdit => "Radio Edit",
            VariationType::Extended => "Extended",
            VariationType::Demo => "Demo",
            VariationType::Other => "Other",
        }
    }
}

impl fmt::Display for VariationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A right-side track that also exists (exactly or similarly) on the left.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRecord {
    pub track: Track,
    pub in_left: bool,
    pub in_right: bool,
    pub match_type: MatchType,
    pub variation_type: Option<VariationType>,
}

impl DuplicateRecord {
    pub fn exact(track: Track) -> Self {
        Self {
            track,
            in_left: true,
            in_right: true,
            match_type: MatchType::Exact,
            variation_type: None,
        }
    }

    pub fn similar(track: Track, variation_type: Option<VariationType>) -> Self {
        Self {
            track,
            in_left: true,
            in_right: true,
            match_type: MatchType::Similar,
            variation_type,
        }
    }

    pub fn uri(&self) -> &str {
        &self.track.uri
    }
}

/// Which playlist(s) selected duplicates are removed from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeleteTarget {
    Left,
    Right,
    #[default]
    Both,
}

impl DeleteTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            DeleteTarget::Left => "left",
            DeleteTarget::Right => "right",
            DeleteTarget::Both => "both",
        }
    }

    pub fn includes_left(self) -> bool {
        matches!(self, DeleteTarget::Left | DeleteTarget::Both)
    }

    pub fn includes_right(self) -> bool {
        matches!(self, DeleteTarget::Right | DeleteTarget::Both)
    }
}
