//! Music-service client.
//!
//! Every request goes through `send_with_retry`, which handles rate limits,
//! server errors, transport errors and a single token refresh on 401.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Credentials, RetryPolicy};
use crate::error::{Result, SpotifyError};
use crate::models::{Paging, Playlist, PlaylistTrackEntry, PlaylistTracks, Snapshot, User};

/// Largest page the tracks endpoint serves
pub const TRACKS_PAGE_SIZE: usize = 100;

/// Largest number of URIs accepted by one removal request
pub const REMOVE_BATCH_SIZE: usize = 100;

const PLAYLIST_FIELDS: &str =
    "id,name,description,images,tracks.total,owner.display_name,public,external_urls,snapshot_id";

// ============================================================================
// Provider Seam
// ============================================================================

/// Operations the request-handling layer needs from the music service.
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    async fn current_user(&self) -> Result<User>;

    async fn user_playlists(&self, limit: usize, offset: usize) -> Result<Paging<Playlist>>;

    /// Playlist metadata, including its current snapshot id.
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist>;

    /// Every entry of a playlist, all pages.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<PlaylistTracks>;

    /// Remove all occurrences of `uris`, returning the resulting snapshot.
    async fn remove_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<Snapshot>;
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct SpotifyClient {
    client: Client,
    api_base: String,
    accounts_url: String,
    credentials: RwLock<Credentials>,
    retry: RetryPolicy,
}

impl SpotifyClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            accounts_url: config.accounts_url.clone(),
            credentials: RwLock::new(config.credentials.clone()),
            retry: config.retry,
        })
    }

    /// Build a client, refreshing the access token first if it already expired.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let client = Self::new(config)?;
        if config.credentials.is_expired(Utc::now()) {
            if !config.credentials.can_refresh() {
                return Err(SpotifyError::NotAuthenticated);
            }
            info!("Access token expired, refreshing before first request");
            client.refresh_access_token().await?;
        }
        Ok(client)
    }

    pub async fn access_token(&self) -> String {
        self.credentials.read().await.access_token.clone()
    }

    async fn can_refresh(&self) -> bool {
        self.credentials.read().await.can_refresh()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Exchange the refresh token for a new access token and store it.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let (refresh_token, client_id, client_secret) = {
            let creds = self.credentials.read().await;
            match (&creds.refresh_token, &creds.client_id, &creds.client_secret) {
                (Some(r), Some(id), Some(secret)) => (r.clone(), id.clone(), secret.clone()),
                _ => return Err(SpotifyError::TokenRefresh("no refresh credentials".to_string())),
            }
        };

        let response = self
            .client
            .post(&self.accounts_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
            .send()
            .await
            .map_err(|e| SpotifyError::TokenRefresh(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpotifyError::TokenRefresh(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::TokenRefresh(e.to_string()))?;

        let mut creds = self.credentials.write().await;
        creds.access_token = token.access_token.clone();
        if let Some(rotated) = token.refresh_token {
            creds.refresh_token = Some(rotated);
        }
        creds.expires_at = Some(Utc::now() + chrono::Duration::seconds(token.expires_in));
        info!("Refreshed access token (expires in {}s)", token.expires_in);

        Ok(token.access_token)
    }

    /// Send a request built by `build` (given the current bearer token),
    /// retrying per the client's `RetryPolicy`.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut last_error: Option<SpotifyError> = None;

        for attempt in 1..=max_retries {
            let token = self.access_token().await;
            let response = match build(&self.client, &token).send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < max_retries {
                        let delay = self.retry.backoff_delay(attempt);
                        warn!(
                            "Network error. Retrying after {}ms (attempt {}/{})",
                            delay.as_millis(),
                            attempt,
                            max_retries
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(SpotifyError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let refreshable =
                attempt == 1 && status == StatusCode::UNAUTHORIZED && self.can_refresh().await;

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    let delay = retry_after(response.headers())
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt));
                    warn!(
                        "Rate limited (429). Retrying after {}ms (attempt {}/{})",
                        delay.as_millis(),
                        attempt,
                        max_retries
                    );
                    if attempt < max_retries {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                StatusCode::UNAUTHORIZED if refreshable => {
                    warn!("Token expired (401). Attempting to refresh...");
                    let new_token = self.refresh_access_token().await?;
                    let retried = build(&self.client, &new_token).send().await?;
                    if retried.status().is_success() {
                        return Ok(retried);
                    }
                    return Err(api_error(retried).await);
                }
                StatusCode::BAD_REQUEST => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(SpotifyError::BadRequest(error_message(&text, status)));
                }
                s if s.is_server_error() => {
                    let delay = self.retry.backoff_delay(attempt);
                    warn!(
                        "Server error ({}). Retrying after {}ms (attempt {}/{})",
                        s.as_u16(),
                        delay.as_millis(),
                        attempt,
                        max_retries
                    );
                    if attempt < max_retries {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                _ => {}
            }

            return Err(api_error(response).await);
        }

        Err(last_error.unwrap_or(SpotifyError::RetriesExhausted))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .send_with_retry(|client, token| client.get(url).bearer_auth(token).query(query))
            .await?;
        Ok(response.json().await?)
    }
}

/// `Retry-After` header as a delay, when present and numeric.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Message from a service error body, falling back to the status reason.
pub fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}

async fn api_error(response: Response) -> SpotifyError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    SpotifyError::Api {
        status: status.as_u16(),
        message: error_message(&text, status),
    }
}

#[async_trait]
impl PlaylistProvider for SpotifyClient {
    async fn current_user(&self) -> Result<User> {
        self.get_json(&self.url("me"), &[]).await
    }

    async fn user_playlists(&self, limit: usize, offset: usize) -> Result<Paging<Playlist>> {
        self.get_json(
            &self.url("me/playlists"),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist> {
        self.get_json(
            &self.url(&format!("playlists/{}", playlist_id)),
            &[("fields", PLAYLIST_FIELDS.to_string())],
        )
        .await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<PlaylistTracks> {
        let url = self.url(&format!("playlists/{}/tracks", playlist_id));
        let mut items: Vec<PlaylistTrackEntry> = Vec::new();
        let mut total = 0;
        let mut offset = 0;

        loop {
            let page: Paging<PlaylistTrackEntry> = self
                .get_json(
                    &url,
                    &[("limit", TRACKS_PAGE_SIZE.to_string()), ("offset", offset.to_string())],
                )
                .await?;

            total = page.total;
            let fetched = page.items.len();
            items.extend(page.items);
            debug!("Fetched {}/{} entries of playlist {}", items.len(), total, playlist_id);

            if page.next.is_none() || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        Ok(PlaylistTracks { items, total })
    }

    async fn remove_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<Snapshot> {
        if uris.is_empty() {
            return Err(SpotifyError::BadRequest("No tracks specified".to_string()));
        }

        let url = self.url(&format!("playlists/{}/tracks", playlist_id));
        let mut snapshot: Option<Snapshot> = None;
        let mut removed = 0;

        for batch in uris.chunks(REMOVE_BATCH_SIZE) {
            let body = json!({
                "tracks": batch.iter().map(|uri| json!({ "uri": uri })).collect::<Vec<_>>(),
            });
            debug!("DELETE {} ({} tracks)", url, batch.len());
            let result = match self
                .send_with_retry(|client, token| client.delete(&url).bearer_auth(token).json(&body))
                .await
            {
                Ok(response) => response.json::<Snapshot>().await.map_err(SpotifyError::from),
                Err(e) => Err(e),
            };

            match (result, snapshot.take()) {
                (Ok(next), _) => {
                    removed += batch.len();
                    snapshot = Some(next);
                }
                // Earlier batches stay removed on the service side
                (Err(e), Some(last)) => {
                    warn!(
                        "Removal from {} stopped after {}/{} tracks: {}",
                        playlist_id,
                        removed,
                        uris.len(),
                        e
                    );
                    return Err(SpotifyError::PartialRemoval {
                        removed,
                        snapshot_id: last.snapshot_id,
                        source: Box::new(e),
                    });
                }
                (Err(e), None) => return Err(e),
            }
        }

        info!("Removed {} tracks from playlist {}", uris.len(), playlist_id);
        snapshot.ok_or(SpotifyError::RetriesExhausted)
    }
}
