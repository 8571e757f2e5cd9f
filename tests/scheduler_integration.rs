//! Scheduler Integration Tests for Netpulse
//!
//! Drives the public API end to end: probes with fake transports, the
//! scheduler on virtual time, and events arriving at consumer sinks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use netpulse::dispatch::{ChannelSink, FanoutSink, LatestValues};
use netpulse::probe::bandwidth::{BandwidthConfig, BandwidthProbe, SpeedTest};
use netpulse::probe::network::{
    CounterSource, InterfaceCounters, NetworkStatsConfig, NetworkStatsProbe,
};
use netpulse::probe::ping::{
    JitterLatencyConfig, JitterLatencyProbe, PacketLossConfig, PacketLossProbe, Pinger,
};
use netpulse::probe::signal::{SignalStrengthProbe, SystemCommandRunner};
use netpulse::probe::{FailureMode, Measurement, Metric, Probe, ProbeError, ProbeSpec};
use netpulse::{Event, Scheduler};
use tokio::sync::mpsc::Receiver;

// =============================================================================
// Test Helpers
// =============================================================================

/// Interface whose counters grow by a fixed amount per read.
struct GrowingCounters {
    rx: u64,
    step: u64,
}

impl CounterSource for GrowingCounters {
    fn read(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        self.rx += self.step;
        Ok(vec![InterfaceCounters {
            name: "eth0".to_string(),
            rx_bytes: self.rx,
            tx_bytes: self.rx / 2,
        }])
    }
}

/// Replies 10ms to even sequence numbers and 20ms to odd ones, or drops
/// odd ones when `lossy`.
struct AlternatingPinger {
    lossy: bool,
}

#[async_trait::async_trait]
impl Pinger for AlternatingPinger {
    async fn ping(
        &self,
        _host: &str,
        seq: u16,
        _timeout: Option<Duration>,
    ) -> Result<Duration, ProbeError> {
        match (seq % 2, self.lossy) {
            (0, _) => Ok(Duration::from_millis(10)),
            (_, true) => Err(ProbeError::Timeout),
            (_, false) => Ok(Duration::from_millis(20)),
        }
    }
}

/// Speed test reporting a fixed rate and counting calls.
struct FixedSpeedTest {
    bytes_per_sec: f64,
    calls: AtomicU64,
}

#[async_trait::async_trait]
impl SpeedTest for FixedSpeedTest {
    async fn download_bytes_per_sec(&self, _token: &str) -> Result<f64, ProbeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.bytes_per_sec)
    }
}

/// Probe that takes a while to answer.
struct SlowProbe {
    metric: Metric,
    delay: Duration,
}

#[async_trait::async_trait]
impl Probe for SlowProbe {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        tokio::time::sleep(self.delay).await;
        Ok(Measurement::zero(self.metric))
    }
}

fn spec(probe: impl Probe, period: Duration, on_failure: FailureMode) -> ProbeSpec {
    let metric = probe.metric();
    ProbeSpec::new(probe, period).with_failure_policy(on_failure.into_policy(metric))
}

fn drain(rx: &mut Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn of(events: &[Event], metric: Metric) -> Vec<&Event> {
    events.iter().filter(|e| e.metric() == metric).collect()
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dashboard_pipeline() {
    let speed_test = Arc::new(FixedSpeedTest {
        bytes_per_sec: 12_500_000.0,
        calls: AtomicU64::new(0),
    });

    let specs = vec![
        spec(
            NetworkStatsProbe::with_source(
                NetworkStatsConfig::default(),
                Box::new(GrowingCounters { rx: 0, step: 500 }),
            ),
            Duration::from_millis(500),
            FailureMode::Propagate,
        ),
        spec(
            PacketLossProbe::with_pinger(
                PacketLossConfig::default(),
                Arc::new(AlternatingPinger { lossy: true }),
            ),
            Duration::from_secs(10),
            FailureMode::Propagate,
        ),
        spec(
            JitterLatencyProbe::with_pinger(
                JitterLatencyConfig::default(),
                Arc::new(AlternatingPinger { lossy: false }),
            ),
            Duration::from_secs(10),
            FailureMode::Propagate,
        ),
        spec(
            BandwidthProbe::with_speed_test(
                BandwidthConfig::default().with_token("token"),
                speed_test.clone(),
            ),
            Duration::from_secs(10),
            FailureMode::SubstituteZero,
        ),
        spec(
            SignalStrengthProbe::for_os("plan9", Arc::new(SystemCommandRunner)),
            Duration::from_secs(10),
            FailureMode::Propagate,
        ),
    ];

    let latest = Arc::new(LatestValues::new());
    let (channel, mut rx) = ChannelSink::new(1_024);
    let sink = FanoutSink::new()
        .with(latest.clone())
        .with(Arc::new(channel));

    let handle = Scheduler::start(specs, Arc::new(sink)).unwrap();
    assert_eq!(handle.probes().len(), 5);

    tokio::time::sleep(Duration::from_millis(20_250)).await;
    let events = drain(&mut rx);

    // NetworkStats: 40 samples, first one reports zero rates.
    let network = of(&events, Metric::NetworkStats);
    assert_eq!(network.len(), 40);
    assert_eq!(network[0].channel(), "network-data");
    match (&network[0].payload, &network[1].payload) {
        (Measurement::NetworkStats(first), Measurement::NetworkStats(second)) => {
            assert_eq!(first.rx_bytes_per_sec, 0.0);
            assert!((second.rx_bytes_per_sec - 1_000.0).abs() < 1e-6);
            assert!((second.tx_bytes_per_sec - 500.0).abs() < 1e-6);
            assert_eq!(second.interfaces, vec!["eth0".to_string()]);
        }
        other => panic!("unexpected payloads: {other:?}"),
    }

    // PacketLoss: every odd request lost.
    let loss = of(&events, Metric::PacketLoss);
    assert_eq!(loss.len(), 2);
    assert_eq!(loss[0].channel(), "packet-loss-data");
    match &loss[0].payload {
        Measurement::PacketLoss(p) => assert!((p.percent - 50.0).abs() < 1e-9),
        other => panic!("unexpected payload: {other:?}"),
    }

    // JitterLatency: alternating 10ms / 20ms replies.
    let jitter = of(&events, Metric::JitterLatency);
    assert_eq!(jitter.len(), 2);
    match &jitter[0].payload {
        Measurement::JitterLatency(j) => {
            assert!((j.latency_ms - 15.0).abs() < 1e-6);
            assert!((j.jitter_ms - 10.0).abs() < 1e-6);
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    // Bandwidth: normalized download, zero upload.
    let bandwidth = of(&events, Metric::Bandwidth);
    assert_eq!(bandwidth.len(), 2);
    assert_eq!(bandwidth[0].channel(), "bandwidth-data");
    match &bandwidth[0].payload {
        Measurement::Bandwidth(b) => {
            assert!((b.download_mbps - 125.0).abs() < 1e-9);
            assert_eq!(b.upload_mbps, 0.0);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
    assert_eq!(speed_test.calls.load(Ordering::Relaxed), 2);

    // SignalStrength: unsupported platform never reaches the consumer.
    assert!(of(&events, Metric::SignalStrength).is_empty());
    let signal = handle.stats(Metric::SignalStrength).unwrap();
    assert_eq!(signal.ticks, 2);
    assert_eq!(signal.failed, 2);
    assert!(
        signal
            .last_diagnostic
            .unwrap()
            .message
            .contains("unsupported platform")
    );

    // Latest-value view holds one event per delivered metric.
    assert_eq!(latest.snapshot().len(), 4);
    assert!(latest.latest(Metric::SignalStrength).is_none());

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_bandwidth_credential_substitutes_zero() {
    let speed_test = Arc::new(FixedSpeedTest {
        bytes_per_sec: 1.0,
        calls: AtomicU64::new(0),
    });
    let config = BandwidthConfig::default();
    let probe = BandwidthProbe::with_speed_test(config.clone(), speed_test.clone());
    let specs = vec![spec(probe, config.interval, config.on_failure)];

    let (channel, mut rx) = ChannelSink::new(16);
    let handle = Scheduler::start(specs, Arc::new(channel)).unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, Measurement::zero(Metric::Bandwidth));
    assert_eq!(speed_test.calls.load(Ordering::Relaxed), 0);

    let stats = handle.stats(Metric::Bandwidth).unwrap();
    assert_eq!(stats.substituted, 1);
    assert!(stats.last_diagnostic.unwrap().message.contains("config error"));

    handle.stop().await;
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_silences_in_flight_invocations() {
    let specs = vec![
        spec(
            SlowProbe {
                metric: Metric::JitterLatency,
                delay: Duration::from_secs(15),
            },
            Duration::from_secs(10),
            FailureMode::Propagate,
        ),
        spec(
            SlowProbe {
                metric: Metric::NetworkStats,
                delay: Duration::ZERO,
            },
            Duration::from_millis(500),
            FailureMode::Propagate,
        ),
    ];

    let (channel, mut rx) = ChannelSink::new(1_024);
    let handle = Scheduler::start(specs, Arc::new(channel)).unwrap();
    assert!(handle.is_running());

    tokio::time::sleep(Duration::from_millis(20_250)).await;
    let before = drain(&mut rx);
    assert_eq!(of(&before, Metric::NetworkStats).len(), 40);
    // Started at 10s, finished at 25s: not yet.
    assert!(of(&before, Metric::JitterLatency).is_empty());
    assert_eq!(handle.stats(Metric::JitterLatency).unwrap().in_flight, 2);

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(drain(&mut rx).is_empty());
}
