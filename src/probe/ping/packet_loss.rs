//! Packet loss probe.
//!
//! Sends a burst of sequential echo requests and reports the share that
//! went unanswered.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pinger::{DEFAULT_HOST, IcmpPinger, Pinger};
use crate::probe::{FailureMode, Measurement, Metric, OverlapPolicy, PacketLoss, Probe, ProbeError};

/// Default collection interval (10 seconds).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-request timeout (2 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of echo requests per burst.
const DEFAULT_COUNT: u16 = 10;

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_count() -> u16 {
    DEFAULT_COUNT
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Configuration for the packet loss probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketLossConfig {
    /// Enable this probe (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Tick period (default: 10s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Failure handling (default: propagate).
    #[serde(default)]
    pub on_failure: FailureMode,
    /// Overlapping tick handling (default: allow).
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Target host (default: 8.8.8.8).
    #[serde(default = "default_host")]
    pub host: String,
    /// Echo requests per burst (default: 10).
    #[serde(default = "default_count")]
    pub count: u16,
    /// Per-request timeout (default: 2s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PacketLossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            on_failure: FailureMode::Propagate,
            overlap: OverlapPolicy::Allow,
            host: default_host(),
            count: DEFAULT_COUNT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PacketLossConfig {
    /// Set the target host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the number of echo requests per burst.
    pub fn with_count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the tick period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Packet loss probe.
pub struct PacketLossProbe {
    config: PacketLossConfig,
    pinger: Arc<dyn Pinger>,
}

impl PacketLossProbe {
    /// Create a probe that sends ICMP echo requests.
    pub fn new(config: PacketLossConfig) -> Self {
        Self::with_pinger(config, Arc::new(IcmpPinger::new()))
    }

    /// Create a probe with a custom reachability transport.
    pub fn with_pinger(config: PacketLossConfig, pinger: Arc<dyn Pinger>) -> Self {
        Self { config, pinger }
    }

    pub fn config(&self) -> &PacketLossConfig {
        &self.config
    }
}

impl std::fmt::Debug for PacketLossProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketLossProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for PacketLossProbe {
    fn metric(&self) -> Metric {
        Metric::PacketLoss
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        let count = self.config.count;
        if count == 0 {
            return Err(ProbeError::Config("packet loss count must be positive".to_string()));
        }

        // Each request completes or times out before the next is sent.
        let mut lost = 0u16;
        for seq in 0..count {
            if let Err(e) = self
                .pinger
                .ping(&self.config.host, seq, Some(self.config.timeout))
                .await
            {
                tracing::trace!(host = %self.config.host, seq, error = %e, "Echo request lost");
                lost += 1;
            }
        }

        let percent = f64::from(lost) / f64::from(count) * 100.0;
        tracing::debug!(host = %self.config.host, lost, count, percent, "Packet loss measured");
        Ok(Measurement::PacketLoss(PacketLoss { percent }))
    }
}
