//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for the five
//! probe sections (period, failure and overlap policies, probe-specific
//! settings) and their conversion into [`ProbeSpec`](crate::probe::ProbeSpec)s.

mod app;
mod validation;

pub use app::{AppConfig, BANDWIDTH_TOKEN_ENV, ProbesConfig};
pub use validation::{ConfigError, expand_env_vars};
