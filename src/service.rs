//! Request-handling layer: compare, delete, list playlists.
//!
//! Validates caller input, loads playlists through the provider (served from
//! the snapshot cache when unchanged) and reports deletion outcomes per
//! target playlist.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{PlaylistCache, SnapshotStore};
use crate::error::{ServiceError, SpotifyError};
use crate::matcher::find_duplicates;
use crate::models::{DeleteTarget, DuplicateRecord, Playlist, PlaylistTracks};
use crate::selection::{group_by_variation, CompareStats, VariationGroup};
use crate::spotify::PlaylistProvider;

const PLAYLISTS_PAGE_SIZE: usize = 50;

// ============================================================================
// Request / Response Shapes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistListing {
    pub playlists: Vec<Playlist>,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl PlaylistListing {
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareReport {
    pub duplicates: Vec<DuplicateRecord>,
    pub stats: CompareStats,
}

impl CompareReport {
    pub fn groups(&self) -> Vec<VariationGroup<'_>> {
        group_by_variation(&self.duplicates)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub left_playlist_id: Option<String>,
    #[serde(default)]
    pub right_playlist_id: Option<String>,
    #[serde(default)]
    pub track_uris: Vec<String>,
    #[serde(default)]
    pub delete_from: DeleteTarget,
}

/// Result of removing tracks from one playlist. A failure after some
/// batches went through keeps their count and the last snapshot id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TargetOutcome {
    Removed {
        #[serde(rename = "snapshotId")]
        snapshot_id: String,
        removed: usize,
    },
    Failed {
        error: String,
        removed: usize,
        #[serde(rename = "snapshotId", skip_serializing_if = "Option::is_none")]
        snapshot_id: Option<String>,
    },
}

impl TargetOutcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, TargetOutcome::Removed { .. })
    }

    /// URIs actually removed from this playlist.
    pub fn removed(&self) -> usize {
        match self {
            TargetOutcome::Removed { removed, .. } | TargetOutcome::Failed { removed, .. } => *removed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// Most URIs removed from any one target playlist.
    pub deleted_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<TargetOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<TargetOutcome>,
}

impl DeleteReport {
    fn outcomes(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.left.iter().chain(self.right.iter())
    }

    pub fn success(&self) -> bool {
        self.outcomes().all(TargetOutcome::is_removed)
    }

    /// 200 when every target succeeded, 502 when nothing was removed
    /// anywhere, 207 otherwise.
    pub fn status_code(&self) -> u16 {
        if self.success() {
            200
        } else if self.outcomes().all(|o| o.removed() == 0) {
            502
        } else {
            207
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct DedupService<P, S> {
    provider: P,
    playlists: PlaylistCache<Arc<S>>,
    tracks: PlaylistCache<Arc<S>>,
}

impl<P: PlaylistProvider, S: SnapshotStore> DedupService<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        let store = Arc::new(store);
        Self {
            provider,
            playlists: PlaylistCache::new(Arc::clone(&store)),
            tracks: PlaylistCache::with_namespace(store, "tracks"),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Playlist metadata cache; `clear` and `stats` cover the shared store.
    pub fn cache(&self) -> &PlaylistCache<Arc<S>> {
        &self.playlists
    }

    /// All of the user's playlists, recording which were unchanged since the
    /// last listing.
    pub async fn list_playlists(&self) -> Result<PlaylistListing, ServiceError> {
        let removed = self.playlists.clear_old_versions();
        if removed > 0 {
            info!("Removed {} stale cache entries", removed);
        }

        let mut playlists = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.provider.user_playlists(PLAYLISTS_PAGE_SIZE, offset).await?;
            let fetched = page.items.len();
            playlists.extend(page.items);
            if page.next.is_none() || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        let mut cache_hits = 0;
        let mut cache_misses = 0;
        for playlist in &playlists {
            if self.playlists.needs_refresh(&playlist.id, &playlist.snapshot_id) {
                cache_misses += 1;
                self.playlists.put(&playlist.id, &playlist.snapshot_id, playlist);
            } else {
                cache_hits += 1;
            }
        }

        let listing = PlaylistListing {
            playlists,
            cache_hits,
            cache_misses,
        };
        info!(
            "Cache performance: {} hits, {} misses ({:.1}% hit rate)",
            listing.cache_hits,
            listing.cache_misses,
            listing.hit_rate()
        );
        Ok(listing)
    }

    /// Compare two playlists, loading both concurrently.
    pub async fn compare(
        &self,
        left_playlist_id: Option<&str>,
        right_playlist_id: Option<&str>,
    ) -> Result<CompareReport, ServiceError> {
        let (left_id, right_id) = match (non_empty(left_playlist_id), non_empty(right_playlist_id)) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(ServiceError::BadRequest("Missing playlist IDs")),
        };
        if left_id == right_id {
            return Err(ServiceError::BadRequest("Cannot compare a playlist with itself"));
        }

        let (left, right) = tokio::try_join!(self.load_tracks(left_id), self.load_tracks(right_id))?;

        let duplicates = find_duplicates(&left.items, &right.items);
        let stats = CompareStats::new(left.items.len(), right.items.len(), &duplicates);
        info!(
            "Compared {} ({} entries) with {} ({} entries): {} duplicates",
            left_id, stats.left_total, right_id, stats.right_total, stats.duplicates_found
        );

        Ok(CompareReport { duplicates, stats })
    }

    /// Entries of a playlist, from cache when its snapshot id is unchanged.
    async fn load_tracks(&self, playlist_id: &str) -> Result<PlaylistTracks, SpotifyError> {
        let playlist = self.provider.playlist(playlist_id).await?;
        if let Some(tracks) = self
            .tracks
            .get_fresh::<PlaylistTracks>(playlist_id, &playlist.snapshot_id)
        {
            debug!("Cache hit for playlist {} ({})", playlist_id, playlist.snapshot_id);
            return Ok(tracks);
        }

        debug!("Cache miss for playlist {}, fetching tracks", playlist_id);
        let tracks = self.provider.playlist_tracks(playlist_id).await?;
        self.tracks.put(playlist_id, &playlist.snapshot_id, &tracks);
        Ok(tracks)
    }

    /// Remove the requested URIs from the target playlist(s). Each target's
    /// outcome is reported separately; the call itself only fails on
    /// invalid input.
    pub async fn delete(&self, request: DeleteRequest) -> Result<DeleteReport, ServiceError> {
        let mut seen = FxHashSet::default();
        let uris: Vec<String> = request
            .track_uris
            .into_iter()
            .filter(|uri| !uri.is_empty() && seen.insert(uri.clone()))
            .collect();
        if uris.is_empty() {
            return Err(ServiceError::BadRequest("No tracks specified"));
        }

        let left_id = non_empty(request.left_playlist_id.as_deref());
        let right_id = non_empty(request.right_playlist_id.as_deref());

        let (left_target, right_target) = match request.delete_from {
            DeleteTarget::Left => (
                Some(left_id.ok_or(ServiceError::BadRequest("Left playlist ID required"))?),
                None,
            ),
            DeleteTarget::Right => (
                None,
                Some(right_id.ok_or(ServiceError::BadRequest("Right playlist ID required"))?),
            ),
            DeleteTarget::Both => match (left_id, right_id) {
                (Some(l), Some(r)) => (Some(l), Some(r)),
                _ => return Err(ServiceError::BadRequest("Both playlist IDs required")),
            },
        };

        let (left, right) = tokio::join!(
            self.remove_from(left_target, &uris),
            self.remove_from(right_target, &uris)
        );

        let mut report = DeleteReport {
            deleted_count: 0,
            left,
            right,
        };
        report.deleted_count = report.outcomes().map(TargetOutcome::removed).max().unwrap_or(0);
        Ok(report)
    }

    async fn remove_from(&self, playlist_id: Option<&str>, uris: &[String]) -> Option<TargetOutcome> {
        let playlist_id = playlist_id?;
        let outcome = match self.provider.remove_tracks(playlist_id, uris).await {
            Ok(snapshot) => TargetOutcome::Removed {
                snapshot_id: snapshot.snapshot_id,
                removed: uris.len(),
            },
            Err(e) => {
                warn!("Failed to remove tracks from {}: {}", playlist_id, e);
                let snapshot_id = match &e {
                    SpotifyError::PartialRemoval { snapshot_id, .. } => Some(snapshot_id.clone()),
                    _ => None,
                };
                TargetOutcome::Failed {
                    error: e.to_string(),
                    removed: e.removed(),
                    snapshot_id,
                }
            }
        };
        Some(outcome)
    }
}

fn non_empty(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|s| !s.is_empty())
}
