//! Probe Layer
//!
//! Independent async measurements, one per metric. A probe only measures;
//! scheduling and delivery belong to the [`scheduler`](crate::scheduler) and
//! [`dispatch`](crate::dispatch) layers.
//!
//! # Architecture
//!
//! - [`Probe`]: Core trait for implementing probes
//! - [`ProbeSpec`]: A probe bound to its period and policies
//! - [`Measurement`] / [`Metric`]: Typed results and their identity
//!
//! # Example
//!
//! ```rust,no_run
//! use netpulse::probe::ProbeSpec;
//! use netpulse::probe::ping::{PacketLossConfig, PacketLossProbe};
//!
//! # async fn run() -> Result<(), netpulse::probe::ProbeError> {
//! let config = PacketLossConfig::default().with_host("1.1.1.1");
//! let spec = ProbeSpec::new(PacketLossProbe::new(config.clone()), config.interval);
//! let loss = spec.run_once().await?;
//! println!("{loss:?}");
//! # Ok(())
//! # }
//! ```

pub mod bandwidth;
pub mod network;
pub mod ping;
pub mod signal;
mod spec;
mod traits;

pub use spec::{FailureMode, FailurePolicy, MIN_PERIOD, OverlapPolicy, ProbeSpec};
pub(crate) use spec::Invocation;
pub use traits::{
    Bandwidth, JitterLatency, Measurement, Metric, NetworkStats, PacketLoss, Probe, ProbeError,
    SignalStrength, SignalUnit,
};
