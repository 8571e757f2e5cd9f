//! Core probe traits and types.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Kind of metric produced by a probe.
///
/// The identity of a metric never changes; each [`Measurement`] variant
/// maps to exactly one metric.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Metric {
    /// Interface throughput counters.
    NetworkStats,
    /// Percentage of unanswered reachability probes.
    PacketLoss,
    /// Round-trip latency and its variation.
    JitterLatency,
    /// Download/upload rate from a speed test.
    Bandwidth,
    /// Wireless signal strength.
    SignalStrength,
}

impl Metric {
    /// All metrics, in display order.
    pub const ALL: [Metric; 5] = [
        Metric::NetworkStats,
        Metric::PacketLoss,
        Metric::JitterLatency,
        Metric::Bandwidth,
        Metric::SignalStrength,
    ];

    /// Name of the event channel the consumer listens on for this metric.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::NetworkStats => "network-data",
            Self::PacketLoss => "packet-loss-data",
            Self::JitterLatency => "jitter-latency-data",
            Self::Bandwidth => "bandwidth-data",
            Self::SignalStrength => "wifi-signal-strength-data",
        }
    }
}

/// Aggregate interface throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    /// Receive rate since the previous sample.
    pub rx_bytes_per_sec: f64,
    /// Transmit rate since the previous sample.
    pub tx_bytes_per_sec: f64,
    /// Cumulative bytes received across the sampled interfaces.
    pub rx_bytes_total: u64,
    /// Cumulative bytes transmitted across the sampled interfaces.
    pub tx_bytes_total: u64,
    /// Interfaces included in the sample.
    pub interfaces: Vec<String>,
}

/// Packet loss over one probe burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketLoss {
    /// Lost probes as a percentage in `0..=100`.
    pub percent: f64,
}

/// Latency and jitter over one probe burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JitterLatency {
    pub jitter_ms: f64,
    pub latency_ms: f64,
}

/// Speed test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bandwidth {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// Unit of a signal strength reading; depends on the platform that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignalUnit {
    /// Signal quality percentage (Windows).
    Percent,
    /// Received signal strength indicator in dBm (macOS).
    Dbm,
}

/// Wireless signal strength reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalStrength {
    pub value: i32,
    pub unit: SignalUnit,
}

/// Typed result of one successful probe invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measurement {
    NetworkStats(NetworkStats),
    PacketLoss(PacketLoss),
    JitterLatency(JitterLatency),
    Bandwidth(Bandwidth),
    SignalStrength(SignalStrength),
}

impl Measurement {
    /// Metric this measurement belongs to.
    pub fn metric(&self) -> Metric {
        match self {
            Self::NetworkStats(_) => Metric::NetworkStats,
            Self::PacketLoss(_) => Metric::PacketLoss,
            Self::JitterLatency(_) => Metric::JitterLatency,
            Self::Bandwidth(_) => Metric::Bandwidth,
            Self::SignalStrength(_) => Metric::SignalStrength,
        }
    }

    /// Zero-valued measurement for a metric.
    pub fn zero(metric: Metric) -> Self {
        match metric {
            Metric::NetworkStats => Self::NetworkStats(NetworkStats {
                rx_bytes_per_sec: 0.0,
                tx_bytes_per_sec: 0.0,
                rx_bytes_total: 0,
                tx_bytes_total: 0,
                interfaces: Vec::new(),
            }),
            Metric::PacketLoss => Self::PacketLoss(PacketLoss { percent: 0.0 }),
            Metric::JitterLatency => Self::JitterLatency(JitterLatency {
                jitter_ms: 0.0,
                latency_ms: 0.0,
            }),
            Metric::Bandwidth => Self::Bandwidth(Bandwidth {
                download_mbps: 0.0,
                upload_mbps: 0.0,
            }),
            Metric::SignalStrength => Self::SignalStrength(SignalStrength {
                value: 0,
                unit: SignalUnit::Percent,
            }),
        }
    }
}

/// Errors a probe invocation can fail with.
///
/// All probe errors are transient from the scheduler's point of view: they are
/// recorded as diagnostics and the probe keeps firing on its period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Network I/O failed (DNS, socket, HTTP transport).
    #[error("network error: {0}")]
    Network(String),

    /// Timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,

    /// External command could not be run or reported an error.
    #[error("command error: {0}")]
    Command(String),

    /// Output could not be parsed into a measurement.
    #[error("parse error: {0}")]
    Parse(String),

    /// Probe is misconfigured (e.g. missing credential).
    #[error("config error: {0}")]
    Config(String),

    /// Probe cannot run on this platform.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// An independently scheduled async measurement for one metric.
///
/// Implementations perform their own I/O and may take seconds to complete.
/// They never deliver results themselves; the scheduler forwards whatever
/// `measure()` returns to the dispatcher.
#[async_trait::async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Metric produced by this probe.
    fn metric(&self) -> Metric;

    /// Perform one measurement.
    async fn measure(&self) -> Result<Measurement, ProbeError>;
}
