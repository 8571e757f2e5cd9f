//! Interface throughput probe.
//!
//! Samples cumulative per-interface byte counters and reports the rate
//! since the previous sample.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::Networks;
use tokio::time::Instant;

use crate::probe::{
    FailureMode, Measurement, Metric, NetworkStats, OverlapPolicy, Probe, ProbeError,
};

/// Default collection interval (500 milliseconds).
const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

/// Configuration for the network statistics probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatsConfig {
    /// Enable this probe (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Tick period (default: 500ms).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Failure handling (default: propagate).
    #[serde(default)]
    pub on_failure: FailureMode,
    /// Overlapping tick handling (default: allow).
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Only sample this interface; all non-loopback interfaces when unset.
    #[serde(default)]
    pub interface: Option<String>,
}

impl Default for NetworkStatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            on_failure: FailureMode::Propagate,
            overlap: OverlapPolicy::Allow,
            interface: None,
        }
    }
}

/// Cumulative counters of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Source of cumulative interface counters.
pub trait CounterSource: Send + 'static {
    fn read(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError>;
}

/// Counters from the operating system via `sysinfo`.
pub struct SysinfoCounters {
    networks: Networks,
}

impl SysinfoCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounters {
    fn read(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        self.networks.refresh();
        Ok(self
            .networks
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.clone(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect())
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_ascii_lowercase().contains("loopback")
}

struct Snapshot {
    at: Instant,
    counters: BTreeMap<String, (u64, u64)>,
}

struct Sampler {
    source: Box<dyn CounterSource>,
    previous: Option<Snapshot>,
}

/// Network statistics probe.
pub struct NetworkStatsProbe {
    config: NetworkStatsConfig,
    sampler: Mutex<Sampler>,
}

impl NetworkStatsProbe {
    /// Create a probe reading operating system counters.
    pub fn new(config: NetworkStatsConfig) -> Self {
        Self::with_source(config, Box::new(SysinfoCounters::new()))
    }

    /// Create a probe with a custom counter source.
    pub fn with_source(config: NetworkStatsConfig, source: Box<dyn CounterSource>) -> Self {
        Self {
            config,
            sampler: Mutex::new(Sampler {
                source,
                previous: None,
            }),
        }
    }

    fn select(&self, counters: Vec<InterfaceCounters>) -> BTreeMap<String, (u64, u64)> {
        counters
            .into_iter()
            .filter(|c| match &self.config.interface {
                Some(wanted) => &c.name == wanted,
                None => !is_loopback(&c.name),
            })
            .map(|c| (c.name, (c.rx_bytes, c.tx_bytes)))
            .collect()
    }

    fn sample(&self) -> Result<NetworkStats, ProbeError> {
        let mut sampler = self
            .sampler
            .lock()
            .map_err(|_| ProbeError::Network("counter sampler lock poisoned".to_string()))?;

        let counters = self.select(sampler.source.read()?);
        if counters.is_empty() {
            return Err(ProbeError::Network(match &self.config.interface {
                Some(name) => format!("network interface '{name}' not found"),
                None => "no network interfaces found".to_string(),
            }));
        }

        let now = Instant::now();
        let (mut rx_delta, mut tx_delta, mut elapsed) = (0u64, 0u64, 0.0f64);
        if let Some(prev) = &sampler.previous {
            elapsed = now.duration_since(prev.at).as_secs_f64();
            for (name, (rx, tx)) in &counters {
                if let Some((prev_rx, prev_tx)) = prev.counters.get(name) {
                    // A counter that went backwards was reset; count it as no traffic.
                    rx_delta += rx.saturating_sub(*prev_rx);
                    tx_delta += tx.saturating_sub(*prev_tx);
                }
            }
        }

        let rate = |delta: u64| {
            if elapsed > 0.0 {
                delta as f64 / elapsed
            } else {
                0.0
            }
        };

        let stats = NetworkStats {
            rx_bytes_per_sec: rate(rx_delta),
            tx_bytes_per_sec: rate(tx_delta),
            rx_bytes_total: counters.values().map(|(rx, _)| rx).sum(),
            tx_bytes_total: counters.values().map(|(_, tx)| tx).sum(),
            interfaces: counters.keys().cloned().collect(),
        };

        sampler.previous = Some(Snapshot { at: now, counters });
        Ok(stats)
    }
}

impl std::fmt::Debug for NetworkStatsProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStatsProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for NetworkStatsProbe {
    fn metric(&self) -> Metric {
        Metric::NetworkStats
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        self.sample().map(Measurement::NetworkStats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Counter source that replays scripted snapshots.
    struct ScriptedCounters(Arc<Mutex<VecDeque<Vec<InterfaceCounters>>>>);

    impl CounterSource for ScriptedCounters {
        fn read(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProbeError::Network("script exhausted".to_string()))
        }
    }

    fn iface(name: &str, rx: u64, tx: u64) -> InterfaceCounters {
        InterfaceCounters {
            name: name.to_string(),
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    fn probe(
        config: NetworkStatsConfig,
        snapshots: Vec<Vec<InterfaceCounters>>,
    ) -> NetworkStatsProbe {
        let script = Arc::new(Mutex::new(snapshots.into_iter().collect()));
        NetworkStatsProbe::with_source(config, Box::new(ScriptedCounters(script)))
    }

    fn stats(m: Measurement) -> NetworkStats {
        match m {
            Measurement::NetworkStats(s) => s,
            other => panic!("unexpected measurement {other:?}"),
        }
    }

    #[test]
    fn test_network_stats_config_defaults() {
        let config = NetworkStatsConfig::default();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert!(config.interface.is_none());
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback("lo"));
        assert!(is_loopback("lo0"));
        assert!(is_loopback("Loopback Pseudo-Interface 1"));
        assert!(!is_loopback("eth0"));
        assert!(!is_loopback("wlan0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_reports_zero_rates() {
        let p = probe(
            NetworkStatsConfig::default(),
            vec![vec![iface("eth0", 1_000, 500), iface("lo", 9_999, 9_999)]],
        );
        let s = stats(p.measure().await.unwrap());
        assert_eq!(s.rx_bytes_per_sec, 0.0);
        assert_eq!(s.tx_bytes_per_sec, 0.0);
        assert_eq!(s.rx_bytes_total, 1_000);
        assert_eq!(s.tx_bytes_total, 500);
        assert_eq!(s.interfaces, vec!["eth0".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rates_from_delta_over_elapsed() {
        let p = probe(
            NetworkStatsConfig::default(),
            vec![
                vec![iface("eth0", 1_000, 500), iface("wlan0", 0, 0)],
                vec![iface("eth0", 2_000, 700), iface("wlan0", 1_000, 300)],
            ],
        );
        p.measure().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let s = stats(p.measure().await.unwrap());
        assert_eq!(s.rx_bytes_per_sec, 4_000.0);
        assert_eq!(s.tx_bytes_per_sec, 1_000.0);
        assert_eq!(s.interfaces, vec!["eth0".to_string(), "wlan0".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_reset_is_not_negative() {
        let p = probe(
            NetworkStatsConfig::default(),
            vec![vec![iface("eth0", 5_000, 5_000)], vec![iface("eth0", 100, 6_000)]],
        );
        p.measure().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let s = stats(p.measure().await.unwrap());
        assert_eq!(s.rx_bytes_per_sec, 0.0);
        assert_eq!(s.tx_bytes_per_sec, 1_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selected_interface_only() {
        let config = NetworkStatsConfig {
            interface: Some("wlan0".to_string()),
            ..NetworkStatsConfig::default()
        };
        let p = probe(config, vec![vec![iface("eth0", 10, 10), iface("wlan0", 7, 3)]]);
        let s = stats(p.measure().await.unwrap());
        assert_eq!(s.rx_bytes_total, 7);
        assert_eq!(s.interfaces, vec!["wlan0".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_interface_is_an_error() {
        let config = NetworkStatsConfig {
            interface: Some("wlan9".to_string()),
            ..NetworkStatsConfig::default()
        };
        let p = probe(config, vec![vec![iface("eth0", 10, 10)]]);
        let err = p.measure().await.unwrap_err();
        assert!(err.to_string().contains("wlan9"));
    }

    #[tokio::test]
    async fn test_source_error_is_forwarded() {
        let p = probe(NetworkStatsConfig::default(), vec![]);
        assert!(p.measure().await.is_err());
    }
}
