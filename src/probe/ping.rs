//! Reachability-based probes.
//!
//! - [`PacketLossProbe`]: share of unanswered echo requests in a burst
//! - [`JitterLatencyProbe`]: mean round-trip time and its variation
//! - [`Pinger`]: the echo transport both probes share

mod jitter;
mod packet_loss;
mod pinger;

pub use jitter::{JitterLatencyConfig, JitterLatencyProbe, summarize};
pub use packet_loss::{PacketLossConfig, PacketLossProbe};
pub use pinger::{DEFAULT_HOST, IcmpPinger, Pinger};

#[cfg(test)]
pub(crate) use pinger::testing;
