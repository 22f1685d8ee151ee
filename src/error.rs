//! Error types for the I/O layers. The comparison core is total and has none.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Spotify API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to refresh token: {0}")]
    TokenRefresh(String),

    #[error("Removed {removed} tracks before failing: {source}")]
    PartialRemoval {
        removed: usize,
        snapshot_id: String,
        #[source]
        source: Box<SpotifyError>,
    },

    #[error("Max retries exceeded")]
    RetriesExhausted,

    #[error("Not authenticated")]
    NotAuthenticated,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required {0} env var")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid log filter: {0}")]
    LogFilter(String),
}

/// Failures of the request-handling layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Upstream failure: {0}")]
    Upstream(#[from] SpotifyError),
}

impl ServiceError {
    /// HTTP-style status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Unauthorized => 401,
            ServiceError::BadRequest(_) => 400,
            ServiceError::Upstream(SpotifyError::NotAuthenticated)
            | ServiceError::Upstream(SpotifyError::Api { status: 401, .. }) => 401,
            ServiceError::Upstream(_) => 500,
        }
    }

    /// Message safe to show to a caller. Upstream details stay in the logs.
    pub fn public_message(&self, action: &str) -> String {
        match self {
            ServiceError::Upstream(SpotifyError::NotAuthenticated)
            | ServiceError::Upstream(SpotifyError::Api { status: 401, .. })
            | ServiceError::Unauthorized => "Unauthorized".to_string(),
            ServiceError::BadRequest(msg) => msg.to_string(),
            ServiceError::Upstream(_) => format!("Failed to {}", action),
        }
    }
}

impl SpotifyError {
    /// URIs already removed when this error ended a batched removal.
    pub fn removed(&self) -> usize {
        match self {
            SpotifyError::PartialRemoval { removed, .. } => *removed,
            _ => 0,
        }
    }
}

pub type Result<T, E = SpotifyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::BadRequest("Missing playlist IDs").status_code(), 400);
        assert_eq!(ServiceError::Unauthorized.status_code(), 401);
        assert_eq!(ServiceError::Upstream(SpotifyError::RetriesExhausted).status_code(), 500);
        assert_eq!(
            ServiceError::Upstream(SpotifyError::NotAuthenticated).status_code(),
            401
        );
        let expired = SpotifyError::Api {
            status: 401,
            message: "The access token expired".to_string(),
        };
        assert_eq!(ServiceError::Upstream(expired).status_code(), 401);
    }

    #[test]
    fn test_public_message_hides_upstream_detail() {
        let err = ServiceError::Upstream(SpotifyError::Api {
            status: 404,
            message: "Not found".to_string(),
        });
        assert_eq!(err.public_message("compare playlists"), "Failed to compare playlists");
        assert_eq!(
            ServiceError::BadRequest("No tracks specified").public_message("delete tracks"),
            "No tracks specified"
        );
    }
}
