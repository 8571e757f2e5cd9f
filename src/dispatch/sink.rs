//! Event sinks: where delivered events go.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

use super::Event;
use crate::probe::Metric;

/// Default capacity of a [`ChannelSink`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Consumer-facing event sink.
///
/// `emit` never fails: delivery is fire-and-forget, and a sink that cannot
/// accept an event drops it.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: Event);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

/// Sink forwarding events over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiver the consumer reads from.
    pub fn new(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(metric = %event.metric(), "Consumer channel full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(metric = %event.metric(), "Consumer not listening, event dropped");
            }
        }
    }
}

/// Replace-latest view: keeps the most recent event per metric.
#[derive(Debug, Default)]
pub struct LatestValues {
    events: RwLock<BTreeMap<Metric, Event>>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent event for a metric.
    pub fn latest(&self, metric: Metric) -> Option<Event> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&metric)
            .cloned()
    }

    /// Most recent event of every metric seen so far, in metric order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl EventSink for LatestValues {
    fn emit(&self, event: Event) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event.metric(), event);
    }
}

/// Sink that logs every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        tracing::info!(
            metric = %event.metric(),
            channel = event.channel(),
            payload = %payload,
            "Event"
        );
    }
}

/// Sink forwarding each event to several sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: Event) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
