//! Bandwidth probe backed by a remote speed test service.
//!
//! - [`BandwidthProbe`]: normalized download rate, upload fixed at 0
//! - [`SpeedTest`] / [`FastComClient`]: the measurement service

mod fast;
mod probe;

pub use fast::{
    DEFAULT_API_URL, DEFAULT_DOWNLOAD_WINDOW, DEFAULT_URL_COUNT, FastComClient, SpeedTest,
};
pub use probe::{BandwidthConfig, BandwidthProbe, DEFAULT_NORMALIZATION};
