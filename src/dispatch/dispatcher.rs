//! Probe outcome to consumer event translation.

use std::sync::{Arc, RwLock};

use super::{Diagnostic, Event, EventSink};
use crate::probe::{Measurement, Metric, ProbeError};

/// What happened to one probe outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Exactly one event reached the sink.
    Emitted,
    /// The probe failed; nothing reached the sink.
    Failed(Diagnostic),
    /// The measurement belonged to another metric and was dropped.
    Mismatched(Diagnostic),
    /// Delivery was closed; the outcome was discarded.
    Discarded,
}

/// Delivers probe outcomes to an [`EventSink`].
///
/// Guarantees:
/// - a successful outcome becomes exactly one event, never batched with others
/// - a failed outcome never reaches the sink
/// - once [`close`](Self::close) returns, no further event is emitted
pub struct Dispatcher {
    sink: Arc<dyn EventSink>,
    open: RwLock<bool>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            open: RwLock::new(true),
        }
    }

    /// Deliver the outcome of one invocation of a `metric` probe.
    pub fn deliver(&self, metric: Metric, outcome: Result<Measurement, ProbeError>) -> Delivery {
        // Held across `emit` so `close` waits for in-progress emissions.
        let open = self.open.read().unwrap_or_else(|e| e.into_inner());
        if !*open {
            tracing::debug!(metric = %metric, "Delivery closed, outcome discarded");
            return Delivery::Discarded;
        }

        match outcome {
            Ok(measurement) if measurement.metric() == metric => {
                self.sink.emit(Event::new(measurement));
                Delivery::Emitted
            }
            Ok(measurement) => {
                let diagnostic = Diagnostic::new(
                    metric,
                    format!("probe returned a '{}' measurement", measurement.metric()),
                );
                tracing::error!(
                    metric = %metric,
                    returned = %measurement.metric(),
                    "Measurement tagged with the wrong metric, dropped"
                );
                Delivery::Mismatched(diagnostic)
            }
            Err(e) => Delivery::Failed(self.diagnose(metric, &e)),
        }
    }

    /// Record a probe failure without delivering anything.
    pub fn diagnose(&self, metric: Metric, error: &ProbeError) -> Diagnostic {
        tracing::warn!(metric = %metric, error = %error, "Probe failed");
        Diagnostic::new(metric, error.to_string())
    }

    /// Stop delivering. Blocks until in-progress emissions finish.
    pub fn close(&self) {
        *self.open.write().unwrap_or_else(|e| e.into_inner()) = false;
    }

    pub fn is_open(&self) -> bool {
        *self.open.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
