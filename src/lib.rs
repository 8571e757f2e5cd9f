//! Netpulse - Network Telemetry Sampling Engine
//!
//! This crate samples five network health metrics on independent periodic
//! schedules and delivers each successful sample as a named event to a
//! consumer (typically a dashboard UI). It can be used as a library, or run
//! as a standalone binary with the `netpulse` executable.
//!
//! # Architecture
//!
//! - **Probes**: network stats, packet loss, jitter/latency, bandwidth and
//!   wireless signal strength
//! - **Scheduler**: one repeating timer per probe, isolated from the others
//! - **Dispatch**: typed events to an [`EventSink`], failures kept as
//!   diagnostics
//! - **Config**: YAML with per-probe periods and failure/overlap policies
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netpulse::{AppConfig, ChannelSink, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let specs = AppConfig::default().to_specs()?;
//!     let (sink, mut events) = ChannelSink::new(64);
//!     let handle = Scheduler::start(specs, Arc::new(sink))?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}: {}", event.channel(), event.to_json());
//!     }
//!
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod probe;
pub mod scheduler;

pub use config::{AppConfig, ConfigError};
pub use dispatch::{ChannelSink, Diagnostic, Event, EventSink, LatestValues, LogSink};
pub use probe::{
    FailurePolicy, Measurement, Metric, OverlapPolicy, Probe, ProbeError, ProbeSpec,
};
pub use scheduler::{ProbeInfo, ProbeStats, Scheduler, SchedulerError, SchedulerHandle};
