//! Application configuration structures.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::validation::{
    ConfigError, expand_env_vars, validate_http_url, validate_interval, validate_ping_target,
};
use crate::probe::bandwidth::{BandwidthConfig, BandwidthProbe};
use crate::probe::network::{NetworkStatsConfig, NetworkStatsProbe};
use crate::probe::ping::{
    JitterLatencyConfig, JitterLatencyProbe, PacketLossConfig, PacketLossProbe,
};
use crate::probe::signal::{SignalStrengthConfig, SignalStrengthProbe};
use crate::probe::{FailureMode, OverlapPolicy, Probe, ProbeSpec};

/// Environment variable holding the bandwidth API credential.
pub const BANDWIDTH_TOKEN_ENV: &str = "BANDWIDTH_CALCULATION_API_KEY";

/// Token used when the bandwidth section does not set one.
const DEFAULT_BANDWIDTH_TOKEN: &str = "${BANDWIDTH_CALCULATION_API_KEY}";

// =============================================================================
// Probe Sections
// =============================================================================

/// Per-probe configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbesConfig {
    #[serde(default)]
    pub network_stats: NetworkStatsConfig,

    #[serde(default)]
    pub packet_loss: PacketLossConfig,

    #[serde(default)]
    pub jitter_latency: JitterLatencyConfig,

    #[serde(default)]
    pub bandwidth: BandwidthConfig,

    #[serde(default)]
    pub signal_strength: SignalStrengthConfig,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
///
/// Every field has a default, so an empty document (or no file at all)
/// yields the standard five probes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probe configurations.
    #[serde(default)]
    pub probes: ProbesConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text cannot be parsed or validated.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = if expanded.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the bandwidth API credential.
    pub fn with_bandwidth_token(mut self, token: impl Into<String>) -> Self {
        self.probes.bandwidth.token = Some(token.into());
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probes = &self.probes;

        validate_interval("network_stats", probes.network_stats.interval)?;
        if let Some(interface) = &probes.network_stats.interface {
            if interface.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "network_stats: interface cannot be empty".to_string(),
                ));
            }
        }

        validate_interval("packet_loss", probes.packet_loss.interval)?;
        validate_ping_target(
            "packet_loss",
            &probes.packet_loss.host,
            probes.packet_loss.count,
        )?;
        if probes.packet_loss.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "packet_loss: timeout must be positive".to_string(),
            ));
        }

        validate_interval("jitter_latency", probes.jitter_latency.interval)?;
        validate_ping_target(
            "jitter_latency",
            &probes.jitter_latency.host,
            probes.jitter_latency.count,
        )?;

        let bandwidth = &probes.bandwidth;
        validate_interval("bandwidth", bandwidth.interval)?;
        validate_http_url("bandwidth", &bandwidth.api_url)?;
        if bandwidth.url_count == 0 {
            return Err(ConfigError::ValidationError(
                "bandwidth: url_count must be positive".to_string(),
            ));
        }
        if bandwidth.download_window.is_zero() {
            return Err(ConfigError::ValidationError(
                "bandwidth: download_window must be positive".to_string(),
            ));
        }
        if !(bandwidth.normalization.is_finite() && bandwidth.normalization > 0.0) {
            return Err(ConfigError::ValidationError(
                "bandwidth: normalization must be a positive number".to_string(),
            ));
        }

        validate_interval("signal_strength", probes.signal_strength.interval)?;
        if probes.signal_strength.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "signal_strength: timeout must be positive".to_string(),
            ));
        }

        if self.enabled_count() == 0 {
            return Err(ConfigError::ValidationError(
                "at least one probe must be enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of enabled probes.
    pub fn enabled_count(&self) -> usize {
        let probes = &self.probes;
        [
            probes.network_stats.enabled,
            probes.packet_loss.enabled,
            probes.jitter_latency.enabled,
            probes.bandwidth.enabled,
            probes.signal_strength.enabled,
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }

    /// Bandwidth API credential.
    ///
    /// A configured token is used as is, since loading already expanded
    /// `${VAR}` references. Without one, the `BANDWIDTH_CALCULATION_API_KEY`
    /// environment variable is read.
    pub fn bandwidth_token(&self) -> Option<String> {
        let token = match &self.probes.bandwidth.token {
            Some(token) => token.clone(),
            None => expand_env_vars(DEFAULT_BANDWIDTH_TOKEN),
        };
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    /// Build the probe specs of every enabled probe.
    ///
    /// A missing bandwidth credential is not an error here: the probe is
    /// still scheduled and fails per invocation.
    ///
    /// # Errors
    /// Returns `ConfigError` if validation fails or a probe cannot be built.
    pub fn to_specs(&self) -> Result<Vec<ProbeSpec>, ConfigError> {
        self.validate()?;
        let probes = &self.probes;
        let mut specs = Vec::with_capacity(self.enabled_count());

        if probes.network_stats.enabled {
            let c = &probes.network_stats;
            specs.push(build_spec(
                NetworkStatsProbe::new(c.clone()),
                c.interval,
                c.on_failure,
                c.overlap,
            ));
        }

        if probes.packet_loss.enabled {
            let c = &probes.packet_loss;
            specs.push(build_spec(
                PacketLossProbe::new(c.clone()),
                c.interval,
                c.on_failure,
                c.overlap,
            ));
        }

        if probes.jitter_latency.enabled {
            let c = &probes.jitter_latency;
            specs.push(build_spec(
                JitterLatencyProbe::new(c.clone()),
                c.interval,
                c.on_failure,
                c.overlap,
            ));
        }

        if probes.bandwidth.enabled {
            let mut c = probes.bandwidth.clone();
            c.token = self.bandwidth_token();
            if c.token.is_none() {
                tracing::warn!(
                    env = BANDWIDTH_TOKEN_ENV,
                    "No bandwidth API credential configured, bandwidth probe will fail"
                );
            }
            let (interval, on_failure, overlap) = (c.interval, c.on_failure, c.overlap);
            specs.push(build_spec(
                BandwidthProbe::new(c)?,
                interval,
                on_failure,
                overlap,
            ));
        }

        if probes.signal_strength.enabled {
            let c = &probes.signal_strength;
            specs.push(build_spec(
                SignalStrengthProbe::new().with_timeout(c.timeout),
                c.interval,
                c.on_failure,
                c.overlap,
            ));
        }

        Ok(specs)
    }
}

fn build_spec(
    probe: impl Probe,
    interval: std::time::Duration,
    on_failure: FailureMode,
    overlap: OverlapPolicy,
) -> ProbeSpec {
    let metric = probe.metric();
    ProbeSpec::new(probe, interval)
        .with_failure_policy(on_failure.into_policy(metric))
        .with_overlap(overlap)
}
