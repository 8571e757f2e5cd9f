//! Scheduler for running probes on independent timers.
//!
//! Each [`ProbeSpec`] gets its own timer task. A tick never waits for the
//! probe: the invocation is spawned and the timer keeps its cadence, so slow
//! probes may overlap themselves unless configured for single-flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::{Delivery, Diagnostic, Dispatcher, EventSink};
use crate::probe::{FailurePolicy, Invocation, Metric, OverlapPolicy, ProbeSpec};

/// Default timeout for stopping the timer tasks (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors rejected before any timer starts.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No specs were given.
    #[error("no probes to schedule")]
    Empty,

    /// Two specs produce the same metric.
    #[error("duplicate probe for metric '{0}'")]
    DuplicateMetric(Metric),

    /// A spec failed validation.
    #[error("invalid probe spec for '{metric}': {reason}")]
    InvalidSpec { metric: Metric, reason: String },
}

/// Metadata about a registered probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub metric: Metric,
    pub period: Duration,
    pub overlap: OverlapPolicy,
    pub substitutes_on_failure: bool,
}

/// Snapshot of one probe's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeStats {
    /// Timer firings.
    pub ticks: u64,
    /// Invocations started.
    pub started: u64,
    /// Invocations that delivered a real measurement.
    pub succeeded: u64,
    /// Invocations that failed and delivered nothing.
    pub failed: u64,
    /// Invocations that failed and delivered the substitute value.
    pub substituted: u64,
    /// Ticks skipped because an invocation was in flight.
    pub skipped: u64,
    /// Outcomes discarded after stop or for carrying the wrong metric.
    pub dropped: u64,
    /// Invocations currently running.
    pub in_flight: usize,
    /// Most recent failure.
    pub last_diagnostic: Option<Diagnostic>,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    substituted: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicUsize,
    last_diagnostic: Mutex<Option<Diagnostic>>,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, diagnostic: Diagnostic) {
        *self
            .last_diagnostic
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(diagnostic);
    }

    fn snapshot(&self) -> ProbeStats {
        ProbeStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            substituted: self.substituted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            last_diagnostic: self
                .last_diagnostic
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Entry point for starting probe schedules.
#[derive(Debug)]
pub struct Scheduler;

impl Scheduler {
    /// Validate the specs and start one repeating timer per spec.
    ///
    /// The first tick of each spec fires one full period after start. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `SchedulerError` if the spec list is empty, two specs share a
    /// metric, or a spec is invalid. No timer is started in that case.
    pub fn start(
        specs: Vec<ProbeSpec>,
        sink: Arc<dyn EventSink>,
    ) -> Result<SchedulerHandle, SchedulerError> {
        if specs.is_empty() {
            return Err(SchedulerError::Empty);
        }

        let mut counters = BTreeMap::new();
        for spec in &specs {
            spec.validate()?;
            if counters
                .insert(spec.metric(), Arc::new(Counters::default()))
                .is_some()
            {
                return Err(SchedulerError::DuplicateMetric(spec.metric()));
            }
        }

        let dispatcher = Arc::new(Dispatcher::new(sink));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let probes: Vec<ProbeInfo> = specs
            .iter()
            .map(|spec| ProbeInfo {
                metric: spec.metric(),
                period: spec.period(),
                overlap: spec.overlap(),
                substitutes_on_failure: matches!(
                    spec.failure_policy(),
                    FailurePolicy::Substitute(_)
                ),
            })
            .collect();

        let timers = specs
            .into_iter()
            .map(|spec| {
                let counters = Arc::clone(&counters[&spec.metric()]);
                tracing::info!(
                    metric = %spec.metric(),
                    period = ?spec.period(),
                    overlap = ?spec.overlap(),
                    "Probe scheduled"
                );
                tokio::spawn(run_timer(
                    spec,
                    counters,
                    Arc::clone(&dispatcher),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(probes = probes.len(), "Scheduler started");
        Ok(SchedulerHandle {
            dispatcher,
            shutdown: shutdown_tx,
            timers,
            probes,
            counters,
        })
    }
}

/// Handle to running schedules.
///
/// Dropping the handle cancels all timers and closes delivery, like
/// [`stop`](Self::stop) without waiting.
pub struct SchedulerHandle {
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Sender<bool>,
    timers: Vec<JoinHandle<()>>,
    probes: Vec<ProbeInfo>,
    counters: BTreeMap<Metric, Arc<Counters>>,
}

impl SchedulerHandle {
    /// Registered probes in registration order.
    pub fn probes(&self) -> &[ProbeInfo] {
        &self.probes
    }

    /// Counters of one probe.
    pub fn stats(&self, metric: Metric) -> Option<ProbeStats> {
        self.counters.get(&metric).map(|c| c.snapshot())
    }

    /// Whether events are still being delivered.
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_open()
    }

    /// Stop with the default timeout.
    pub async fn stop(self) {
        self.stop_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// Stop all schedules.
    ///
    /// Delivery is closed first: once this returns, no event is emitted.
    /// Invocations already running are left to finish and their results are
    /// discarded. Timer tasks still alive after `timeout` are aborted.
    pub async fn stop_with_timeout(mut self, timeout: Duration) {
        self.dispatcher.close();
        let _ = self.shutdown.send(true);

        let timers = std::mem::take(&mut self.timers);
        let aborts: Vec<_> = timers.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(timeout, async {
            for timer in timers {
                if let Err(e) = timer.await {
                    tracing::warn!(error = %e, "Timer task ended abnormally");
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!("Scheduler stop timed out, aborting timers");
            for abort in aborts {
                abort.abort();
            }
        }

        let in_flight: usize = self
            .counters
            .values()
            .map(|c| c.in_flight.load(Ordering::Relaxed))
            .sum();
        tracing::info!(in_flight, "Scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.dispatcher.close();
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("probes", &self.probes)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn run_timer(
    spec: ProbeSpec,
    counters: Arc<Counters>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let metric = spec.metric();
    let period = spec.period();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // A stalled runtime fires the missed ticks rather than merging them.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        Counters::bump(&counters.ticks);
        let in_flight = counters.in_flight.load(Ordering::Relaxed);
        if in_flight > 0 {
            if spec.overlap() == OverlapPolicy::Skip {
                Counters::bump(&counters.skipped);
                tracing::debug!(
                    metric = %metric,
                    "Previous invocation still running, tick skipped"
                );
                continue;
            }
            tracing::debug!(metric = %metric, in_flight, "Starting overlapping invocation");
        }

        // Only this loop acquires, so the check above cannot race another start.
        let slot = InFlight::acquire(metric, Arc::clone(&counters));
        Counters::bump(&counters.started);
        tokio::spawn(run_invocation(spec.clone(), slot, Arc::clone(&dispatcher)));
    }

    tracing::debug!(metric = %metric, "Timer stopped");
}

/// One running invocation of a probe.
///
/// The slot is released on drop, so a panicking probe frees it too. A slot
/// dropped before [`finish`](Self::finish) counts as a failure.
struct InFlight {
    metric: Metric,
    counters: Arc<Counters>,
    finished: bool,
}

impl InFlight {
    fn acquire(metric: Metric, counters: Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            metric,
            counters,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!(metric = %self.metric, "Probe invocation ended abnormally");
            Counters::bump(&self.counters.failed);
            self.counters.record(Diagnostic::new(self.metric, "invocation ended abnormally"));
        }
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Execute one invocation and deliver its outcome.
async fn run_invocation(spec: ProbeSpec, slot: InFlight, dispatcher: Arc<Dispatcher>) {
    let metric = spec.metric();
    let counters = Arc::clone(&slot.counters);
    let start = std::time::Instant::now();

    let (delivery, substituted) = match spec.invoke().await {
        Invocation::Measured(value) => (dispatcher.deliver(metric, Ok(value)), false),
        Invocation::Substituted { value, error } => {
            counters.record(dispatcher.diagnose(metric, &error));
            (dispatcher.deliver(metric, Ok(value)), true)
        }
        Invocation::Failed(error) => (dispatcher.deliver(metric, Err(error)), false),
    };

    match delivery {
        Delivery::Emitted if substituted => Counters::bump(&counters.substituted),
        Delivery::Emitted => Counters::bump(&counters.succeeded),
        Delivery::Failed(diagnostic) => {
            Counters::bump(&counters.failed);
            counters.record(diagnostic);
        }
        Delivery::Mismatched(diagnostic) => {
            Counters::bump(&counters.dropped);
            counters.record(diagnostic);
        }
        Delivery::Discarded => Counters::bump(&counters.dropped),
    }

    slot.finish();
    tracing::trace!(
        metric = %metric,
        duration_ms = start.elapsed().as_millis() as u64,
        "Invocation finished"
    );
}
