//! Bandwidth probe.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::fast::{
    DEFAULT_API_URL, DEFAULT_DOWNLOAD_WINDOW, DEFAULT_URL_COUNT, FastComClient, SpeedTest,
};
use crate::probe::{Bandwidth, FailureMode, Measurement, Metric, OverlapPolicy, Probe, ProbeError};

/// Default collection interval (10 seconds).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Divisor applied to the measured bytes/second before reporting.
pub const DEFAULT_NORMALIZATION: f64 = 100_000.0;

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_on_failure() -> FailureMode {
    FailureMode::SubstituteZero
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_url_count() -> u8 {
    DEFAULT_URL_COUNT
}

fn default_download_window() -> Duration {
    DEFAULT_DOWNLOAD_WINDOW
}

fn default_normalization() -> f64 {
    DEFAULT_NORMALIZATION
}

/// Configuration for the bandwidth probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthConfig {
    /// Enable this probe (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Tick period (default: 10s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Failure handling (default: substitute_zero).
    #[serde(default = "default_on_failure")]
    pub on_failure: FailureMode,
    /// Overlapping tick handling (default: allow).
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Speed test API credential.
    #[serde(default)]
    pub token: Option<String>,
    /// Target discovery endpoint (default: fast.com).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Number of download targets per test (default: 5).
    #[serde(default = "default_url_count")]
    pub url_count: u8,
    /// Download window per test (default: 5s).
    #[serde(default = "default_download_window", with = "humantime_serde")]
    pub download_window: Duration,
    /// Divisor applied to bytes/second (default: 100000).
    #[serde(default = "default_normalization")]
    pub normalization: f64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            on_failure: FailureMode::SubstituteZero,
            overlap: OverlapPolicy::Allow,
            token: None,
            api_url: default_api_url(),
            url_count: DEFAULT_URL_COUNT,
            download_window: DEFAULT_DOWNLOAD_WINDOW,
            normalization: DEFAULT_NORMALIZATION,
        }
    }
}

impl BandwidthConfig {
    /// Set the API credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the failure handling.
    pub fn with_on_failure(mut self, on_failure: FailureMode) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Credential, treating an empty string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Bandwidth probe.
///
/// Reports the normalized download rate and a fixed upload of 0. Failures
/// (including a missing credential) are returned as errors; whether the
/// consumer sees a zero value instead is decided by the failure policy of
/// its [`ProbeSpec`](crate::probe::ProbeSpec).
pub struct BandwidthProbe {
    config: BandwidthConfig,
    speed_test: Arc<dyn SpeedTest>,
}

impl BandwidthProbe {
    /// Create a probe backed by the configured fast.com endpoint.
    ///
    /// # Errors
    /// Returns `ProbeError::Config` if the HTTP client cannot be built.
    pub fn new(config: BandwidthConfig) -> Result<Self, ProbeError> {
        let client = FastComClient::new(&config.api_url, config.url_count, config.download_window)?;
        Ok(Self::with_speed_test(config, Arc::new(client)))
    }

    /// Create a probe with a custom speed test service.
    pub fn with_speed_test(config: BandwidthConfig, speed_test: Arc<dyn SpeedTest>) -> Self {
        Self { config, speed_test }
    }
}

impl std::fmt::Debug for BandwidthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthProbe")
            .field("api_url", &self.config.api_url)
            .field("has_token", &self.config.credential().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for BandwidthProbe {
    fn metric(&self) -> Metric {
        Metric::Bandwidth
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        let token = self.config.credential().ok_or_else(|| {
            ProbeError::Config("bandwidth API credential is not configured".to_string())
        })?;

        let bytes_per_sec = self.speed_test.download_bytes_per_sec(token).await?;
        Ok(Measurement::Bandwidth(Bandwidth {
            download_mbps: bytes_per_sec / self.config.normalization,
            upload_mbps: 0.0,
        }))
    }
}
