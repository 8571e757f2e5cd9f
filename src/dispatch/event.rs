//! Events delivered to the consumer and diagnostics kept for operators.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probe::{Measurement, Metric};

/// A named, typed measurement delivered to the consumer.
///
/// The metric is taken from the payload itself, so an event can never carry
/// a measurement under the wrong tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    metric: Metric,
    /// Measurement carried by the event.
    pub payload: Measurement,
    /// Time the event was produced (UTC).
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(payload: Measurement) -> Self {
        Self {
            metric: payload.metric(),
            payload,
            ts: Utc::now(),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Channel name the consumer listens on.
    pub fn channel(&self) -> &'static str {
        self.metric.channel()
    }

    /// Wire form: metric, channel, timestamp and payload.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "metric": self.metric,
            "channel": self.channel(),
            "ts": self.ts,
            "payload": self.payload,
        })
    }
}

/// A locally handled record of a failed (or substituted) probe invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub metric: Metric,
    pub message: String,
    pub ts: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(metric: Metric, message: impl Into<String>) -> Self {
        Self {
            metric,
            message: message.into(),
            ts: Utc::now(),
        }
    }
}
