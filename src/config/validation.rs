//! Configuration validation utilities.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::probe::{MIN_PERIOD, ProbeError};

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// A configured probe could not be built.
    #[error("failed to build probe: {0}")]
    ProbeError(#[from] ProbeError),
}

/// Matches `${NAME}` and `${NAME:-fallback}`.
fn env_reference() -> &'static Regex {
    static ENV_REFERENCE: OnceLock<Regex> = OnceLock::new();
    ENV_REFERENCE.get_or_init(|| {
        Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}")
            .expect("failed to compile env reference regex")
    })
}

/// Substitute environment references in configuration text.
///
/// `${NAME}` becomes the value of `NAME`, or nothing when it is unset.
/// `${NAME:-fallback}` uses `fallback` instead. Substituted values are not
/// scanned again.
pub fn expand_env_vars(input: &str) -> String {
    env_reference()
        .replace_all(input, |caps: &Captures| {
            std::env::var(&caps["name"]).unwrap_or_else(|_| {
                caps.name("fallback").map_or_else(String::new, |m| m.as_str().to_string())
            })
        })
        .into_owned()
}

/// Check a probe interval against [`MIN_PERIOD`].
pub(crate) fn validate_interval(section: &str, interval: Duration) -> Result<(), ConfigError> {
    if interval < MIN_PERIOD {
        return Err(ConfigError::ValidationError(format!(
            "{section}: interval {} is below the minimum of {}",
            humantime::format_duration(interval),
            humantime::format_duration(MIN_PERIOD)
        )));
    }
    Ok(())
}

/// Check that a ping target is set and a burst sends at least one request.
pub(crate) fn validate_ping_target(
    section: &str,
    host: &str,
    count: u16,
) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{section}: host cannot be empty"
        )));
    }
    if count == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{section}: count must be positive"
        )));
    }
    Ok(())
}

/// Check that a URL parses and uses HTTP(S).
pub(crate) fn validate_http_url(section: &str, url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(url).map_err(|e| {
        ConfigError::ValidationError(format!("{section}: invalid URL '{url}': {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::ValidationError(format!(
            "{section}: unsupported URL scheme '{scheme}'"
        ))),
    }
}
