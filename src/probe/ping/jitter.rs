//! Jitter and latency probe.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pinger::{DEFAULT_HOST, IcmpPinger, Pinger};
use crate::probe::{
    FailureMode, JitterLatency, Measurement, Metric, OverlapPolicy, Probe, ProbeError,
};

/// Default collection interval (10 seconds).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of echo requests per burst.
const DEFAULT_COUNT: u16 = 10;

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_count() -> u16 {
    DEFAULT_COUNT
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Configuration for the jitter/latency probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterLatencyConfig {
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
    /// Per-request timeout; none by default.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for JitterLatencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            on_failure: FailureMode::Propagate,
            overlap: OverlapPolicy::Allow,
            host: default_host(),
            count: DEFAULT_COUNT,
            timeout: None,
        }
    }
}

impl JitterLatencyConfig {
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

    /// Set the tick period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Summarize round-trip samples into jitter and latency.
///
/// Latency is the mean round-trip time. Jitter is the mean absolute
/// difference between consecutive samples. Both are 0 when there are no
/// samples; jitter is 0 with a single sample.
pub fn summarize(rtts_ms: &[f64]) -> JitterLatency {
    if rtts_ms.is_empty() {
        return JitterLatency {
            jitter_ms: 0.0,
            latency_ms: 0.0,
        };
    }

    let latency_ms = rtts_ms.iter().sum::<f64>() / rtts_ms.len() as f64;
    let jitter_ms = if rtts_ms.len() < 2 {
        0.0
    } else {
        let diffs: f64 = rtts_ms.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        diffs / (rtts_ms.len() - 1) as f64
    };

    JitterLatency {
        jitter_ms,
        latency_ms,
    }
}

/// Jitter and latency probe.
pub struct JitterLatencyProbe {
    config: JitterLatencyConfig,
    pinger: Arc<dyn Pinger>,
}

impl JitterLatencyProbe {
    /// Create a probe that sends ICMP echo requests.
    pub fn new(config: JitterLatencyConfig) -> Self {
        Self::with_pinger(config, Arc::new(IcmpPinger::new()))
    }

    /// Create a probe with a custom reachability transport.
    pub fn with_pinger(config: JitterLatencyConfig, pinger: Arc<dyn Pinger>) -> Self {
        Self { config, pinger }
    }

    pub fn config(&self) -> &JitterLatencyConfig {
        &self.config
    }
}

impl std::fmt::Debug for JitterLatencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitterLatencyProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for JitterLatencyProbe {
    fn metric(&self) -> Metric {
        Metric::JitterLatency
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        let mut rtts_ms = Vec::with_capacity(usize::from(self.config.count));
        for seq in 0..self.config.count {
            match self
                .pinger
                .ping(&self.config.host, seq, self.config.timeout)
                .await
            {
                Ok(rtt) => rtts_ms.push(rtt.as_micros() as f64 / 1000.0),
                Err(e) => {
                    tracing::trace!(host = %self.config.host, seq, error = %e, "Echo request lost");
                }
            }
        }

        // No replies at all still yields a (zero) measurement.
        let summary = summarize(&rtts_ms);
        tracing::debug!(
            host = %self.config.host,
            replies = rtts_ms.len(),
            jitter_ms = summary.jitter_ms,
            latency_ms = summary.latency_ms,
            "Jitter and latency measured"
        );
        Ok(Measurement::JitterLatency(summary))
    }
}
