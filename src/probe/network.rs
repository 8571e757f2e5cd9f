//! Network interface probes.
//!
//! - [`NetworkStatsProbe`]: interface throughput from cumulative counters

mod stats;

pub use stats::{
    CounterSource, InterfaceCounters, NetworkStatsConfig, NetworkStatsProbe, SysinfoCounters,
};
