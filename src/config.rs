//! Centralized configuration management.
//!
//! All environment variables are read and validated once at startup through
//! this module. Use `from_lookup` to build a config from any key source.

use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_CACHE_PATH: &str = "playlist-cache.sqlite3";

/// Retry behaviour for service requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_multiplier: 1.3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * multiplier^(attempt - 1)`, attempts start at 1.
    /// Saturates at `Duration::MAX`; a multiplier below 1.0 or non-finite is treated as 1.0.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * multiplier.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// User session credentials.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Session credentials (SPOTIFY_ACCESS_TOKEN required)
    pub credentials: Credentials,
    /// API base URL (default: "https://api.spotify.com/v1")
    pub api_base: String,
    /// Token endpoint (default: "https://accounts.spotify.com/api/token")
    pub accounts_url: String,
    /// SQLite file backing the snapshot cache (default: "playlist-cache.sqlite3")
    pub cache_path: PathBuf,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_token =
            non_empty("SPOTIFY_ACCESS_TOKEN").ok_or(ConfigError::Missing("SPOTIFY_ACCESS_TOKEN"))?;

        let expires_at = match non_empty("SPOTIFY_TOKEN_EXPIRES_AT") {
            Some(raw) => Some(parse_expiry(&raw)?),
            None => None,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or("SPOTIFY_MAX_RETRIES", non_empty("SPOTIFY_MAX_RETRIES"), defaults.max_retries)?
                .max(1),
            backoff_multiplier: parse_multiplier(
                non_empty("SPOTIFY_BACKOFF_MULTIPLIER"),
                defaults.backoff_multiplier,
            )?,
            base_delay: Duration::from_millis(parse_or(
                "SPOTIFY_BASE_DELAY_MS",
                non_empty("SPOTIFY_BASE_DELAY_MS"),
                defaults.base_delay.as_millis() as u64,
            )?),
        };

        Ok(Self {
            credentials: Credentials {
                access_token,
                refresh_token: non_empty("SPOTIFY_REFRESH_TOKEN"),
                client_id: non_empty("SPOTIFY_CLIENT_ID"),
                client_secret: non_empty("SPOTIFY_CLIENT_SECRET"),
                expires_at,
            },
            api_base: non_empty("SPOTIFY_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            accounts_url: non_empty("SPOTIFY_ACCOUNTS_URL").unwrap_or_else(|| DEFAULT_ACCOUNTS_URL.to_string()),
            cache_path: PathBuf::from(
                non_empty("PLAYLIST_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string()),
            ),
            retry,
        })
    }
}

/// Cache path from the environment, for commands that need no credentials.
pub fn cache_path_from_env() -> PathBuf {
    std::env::var("PLAYLIST_CACHE_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH))
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Backoff multiplier: finite and at least 1.0.
fn parse_multiplier(value: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let name = "SPOTIFY_BACKOFF_MULTIPLIER";
    let raw = value.clone();
    let multiplier: f64 = parse_or(name, value, default)?;
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(ConfigError::Invalid {
            name,
            value: raw.unwrap_or_else(|| multiplier.to_string()),
        });
    }
    Ok(multiplier)
}

/// Accepts unix seconds or RFC 3339.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        name: "SPOTIFY_TOKEN_EXPIRES_AT",
        value: raw.to_string(),
    };
    if let Ok(secs) = raw.trim().parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single().ok_or_else(invalid);
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("SPOTIFY_ACCESS_TOKEN", "token")]).unwrap();
        assert_eq!(config.credentials.access_token, "token");
        assert!(!config.credentials.can_refresh());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.accounts_url, DEFAULT_ACCOUNTS_URL);
        assert_eq!(config.cache_path, PathBuf::from(DEFAULT_CACHE_PATH));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_missing_token() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("SPOTIFY_ACCESS_TOKEN"));

        let blank = config_from(&[("SPOTIFY_ACCESS_TOKEN", "  ")]);
        assert!(blank.is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "token"),
            ("SPOTIFY_REFRESH_TOKEN", "refresh"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
            ("SPOTIFY_API_BASE", "http://localhost:8080/v1/"),
            ("SPOTIFY_MAX_RETRIES", "5"),
            ("SPOTIFY_BASE_DELAY_MS", "10"),
            ("SPOTIFY_BACKOFF_MULTIPLIER", "2.0"),
            ("SPOTIFY_TOKEN_EXPIRES_AT", "1700000000"),
        ])
        .unwrap();
        assert!(config.credentials.can_refresh());
        assert_eq!(config.api_base, "http://localhost:8080/v1");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.credentials.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert!(config.credentials.is_expired(Utc::now()));
    }

    #[test]
    fn test_invalid_number() {
        let err = config_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "token"),
            ("SPOTIFY_MAX_RETRIES", "many"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SPOTIFY_MAX_RETRIES"));
    }

    #[test]
    fn test_rfc3339_expiry() {
        let config = config_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "token"),
            ("SPOTIFY_TOKEN_EXPIRES_AT", "2099-01-01T00:00:00Z"),
        ])
        .unwrap();
        assert!(!config.credentials.is_expired(Utc::now()));
    }

    #[test]
    fn test_invalid_multiplier() {
        for bad in ["-1.5", "0.5", "NaN", "inf", "-inf"] {
            let err = config_from(&[
                ("SPOTIFY_ACCESS_TOKEN", "token"),
                ("SPOTIFY_BACKOFF_MULTIPLIER", bad),
            ])
            .unwrap_err();
            assert!(err.to_string().contains("SPOTIFY_BACKOFF_MULTIPLIER"), "{}", bad);
        }

        let config = config_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "token"),
            ("SPOTIFY_BACKOFF_MULTIPLIER", "1.0"),
        ])
        .unwrap();
        assert_eq!(config.retry.backoff_delay(3), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_delay_never_panics() {
        let negative = RetryPolicy {
            backoff_multiplier: -1.5,
            ..RetryPolicy::default()
        };
        assert_eq!(negative.backoff_delay(2), Duration::from_millis(1000));

        let nan = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(nan.backoff_delay(5), Duration::from_millis(1000));

        let huge = RetryPolicy {
            backoff_multiplier: 1e300,
            ..RetryPolicy::default()
        };
        assert_eq!(huge.backoff_delay(10), Duration::MAX);
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2).as_millis(), 1300);
        assert_eq!(policy.backoff_delay(3).as_millis(), 1690);
    }
}
