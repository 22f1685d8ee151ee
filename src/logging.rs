//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays clean for `--json` output. `RUST_LOG`
//! takes precedence over the level passed in.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ConfigError;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Filter directives for `level`, keeping HTTP internals quiet.
pub fn default_directives(level: &str) -> String {
    format!("playlist_dedup={},reqwest=warn,hyper=warn,hyper_util=warn", level)
}

fn build_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives),
        _ => EnvFilter::try_new(default_directives(level)),
    }
    .map_err(|e| ConfigError::LogFilter(e.to_string()))
}

/// Install the global subscriber. Fails if the filter does not parse or a
/// subscriber is already installed.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), ConfigError> {
    let filter = build_filter(level)?;
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ConfigError::LogFilter(e.to_string()))
}
