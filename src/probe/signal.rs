//! Wireless signal strength via platform tools.
//!
//! - [`SignalStrengthProbe`]: the probe
//! - [`SignalSource`]: per-platform capability (`netsh` on Windows,
//!   `airport` on macOS, always-failing elsewhere)
//! - [`CommandRunner`]: external command execution

mod command;
mod probe;
mod source;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use probe::{SignalStrengthConfig, SignalStrengthProbe};
pub use source::{CommandSource, SignalSource, UnsupportedSource, source_for_os};
