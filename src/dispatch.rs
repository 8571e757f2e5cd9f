//! Dispatch Layer
//!
//! Turns probe outcomes into named events for the consumer. The consumer
//! only ever sees successful measurements (or nothing); failures stay here
//! as [`Diagnostic`]s.
//!
//! # Components
//!
//! - [`Dispatcher`]: delivery contract (one event per success, stop gate)
//! - [`EventSink`]: consumer boundary
//! - [`ChannelSink`], [`LatestValues`], [`LogSink`], [`FanoutSink`]: built-in sinks

mod dispatcher;
mod event;
mod sink;

pub use dispatcher::{Delivery, Dispatcher};
pub use event::{Diagnostic, Event};
pub use sink::{
    ChannelSink, DEFAULT_CHANNEL_CAPACITY, EventSink, FanoutSink, LatestValues, LogSink,
};
