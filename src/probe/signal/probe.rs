//! Wireless signal strength probe.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::command::{CommandRunner, SystemCommandRunner};
use super::source::{SignalSource, source_for_os};
use crate::probe::{FailureMode, Measurement, Metric, OverlapPolicy, Probe, ProbeError};

/// Default collection interval (10 seconds).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default time limit for the platform command (5 seconds).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

/// Configuration for the signal strength probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStrengthConfig {
    /// Enable this probe (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Tick period (default: 10s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Failure handling (default: propagate).
    #[serde(default)]
    pub on_failure: FailureMode,
    /// Overlapping tick handling (default: allow).
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Time limit for the platform command (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SignalStrengthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            on_failure: FailureMode::Propagate,
            overlap: OverlapPolicy::Allow,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Signal strength probe.
///
/// A command still running after the timeout is killed and the invocation
/// fails with [`ProbeError::Timeout`].
pub struct SignalStrengthProbe {
    source: Box<dyn SignalSource>,
    timeout: Duration,
}

impl SignalStrengthProbe {
    /// Create a probe for the platform this process runs on.
    pub fn new() -> Self {
        Self::for_os(std::env::consts::OS, Arc::new(SystemCommandRunner))
    }

    /// Create a probe for a named platform with a custom command runner.
    pub fn for_os(os: &str, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_source(source_for_os(os, runner))
    }

    /// Create a probe from an explicit source.
    pub fn with_source(source: Box<dyn SignalSource>) -> Self {
        if !source.supported() {
            tracing::warn!(
                "Signal strength is not supported on this platform; every tick will fail"
            );
        }
        Self {
            source,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the time limit for one reading.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn supported(&self) -> bool {
        self.source.supported()
    }
}

impl Default for SignalStrengthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalStrengthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalStrengthProbe")
            .field("supported", &self.source.supported())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for SignalStrengthProbe {
    fn metric(&self) -> Metric {
        Metric::SignalStrength
    }

    async fn measure(&self) -> Result<Measurement, ProbeError> {
        // Dropping the query future kills the child process.
        let reading = tokio::time::timeout(self.timeout, self.source.query())
            .await
            .map_err(|_| ProbeError::Timeout)??;
        tracing::debug!(value = reading.value, unit = %reading.unit, "Signal strength read");
        Ok(Measurement::SignalStrength(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::signal::command::CommandOutput;
    use crate::probe::{SignalStrength, SignalUnit};
    use std::sync::Mutex;

    /// Runner that returns a canned output and records every invocation.
    struct CannedRunner {
        output: CommandOutput,
        invocations: Mutex<Vec<String>>,
    }

    impl CannedRunner {
        fn new(output: CommandOutput) -> Arc<Self> {
            Arc::new(Self {
                output,
                invocations: Mutex::new(Vec::new()),
            })
        }

        fn stdout(stdout: &str) -> Arc<Self> {
            Self::new(CommandOutput {
                success: true,
                stdout: stdout.to_string(),
                stderr: String::new(),
            })
        }

        fn count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
            self.invocations
                .lock()
                .unwrap()
                .push(format!("{program} {}", args.join(" ")));
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn test_windows_reads_percent() {
        let runner = CannedRunner::stdout("    Signal                 : 71%\n");
        let probe = SignalStrengthProbe::for_os("windows", runner.clone());
        let m = probe.measure().await.unwrap();
        assert_eq!(
            m,
            Measurement::SignalStrength(SignalStrength {
                value: 71,
                unit: SignalUnit::Percent
            })
        );
        assert_eq!(
            runner.invocations.lock().unwrap().as_slice(),
            ["netsh wlan show interfaces"]
        );
    }

    #[tokio::test]
    async fn test_macos_reads_rssi() {
        let runner = CannedRunner::stdout("     agrCtlRSSI: -67\n");
        let probe = SignalStrengthProbe::for_os("macos", runner.clone());
        let m = probe.measure().await.unwrap();
        assert_eq!(
            m,
            Measurement::SignalStrength(SignalStrength {
                value: -67,
                unit: SignalUnit::Dbm
            })
        );
        assert!(runner.invocations.lock().unwrap()[0].ends_with("airport -I"));
    }

    #[tokio::test]
    async fn test_unsupported_platform_never_runs_a_command() {
        let runner = CannedRunner::stdout("Signal : 99%");
        let probe = SignalStrengthProbe::for_os("linux", runner.clone());
        assert!(!probe.supported());

        for _ in 0..5 {
            let err = probe.measure().await.unwrap_err();
            assert!(matches!(err, ProbeError::UnsupportedPlatform(_)));
            assert!(err.to_string().contains("unsupported platform"));
        }
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn test_stderr_is_a_command_error() {
        let runner = CannedRunner::new(CommandOutput {
            success: true,
            stdout: "Signal : 50%".to_string(),
            stderr: "wlan service not running".to_string(),
        });
        let probe = SignalStrengthProbe::for_os("windows", runner);
        let err = probe.measure().await.unwrap_err();
        assert_eq!(
            err,
            ProbeError::Command("stderr: wlan service not running".to_string())
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_command_error() {
        let runner = CannedRunner::new(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
        });
        let probe = SignalStrengthProbe::for_os("macos", runner);
        assert!(matches!(probe.measure().await, Err(ProbeError::Command(_))));
    }

    #[tokio::test]
    async fn test_missing_value_is_a_parse_error() {
        let runner = CannedRunner::stdout("State : disconnected\n");
        let probe = SignalStrengthProbe::for_os("windows", runner);
        assert!(matches!(probe.measure().await, Err(ProbeError::Parse(_))));
    }

    /// Runner whose command never finishes; flags when its future is dropped.
    struct HangingRunner {
        dropped: Arc<std::sync::atomic::AtomicBool>,
    }

    struct DropFlag(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for HangingRunner {
        async fn run(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput, ProbeError> {
            let _flag = DropFlag(Arc::clone(&self.dropped));
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_command_times_out_and_is_dropped() {
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let runner = Arc::new(HangingRunner {
            dropped: Arc::clone(&dropped),
        });
        let probe = SignalStrengthProbe::for_os("windows", runner)
            .with_timeout(Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        assert_eq!(probe.measure().await, Err(ProbeError::Timeout));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(dropped.load(std::sync::atomic::Ordering::Relaxed));
    }

    #[test]
    fn test_config_timeout_from_yaml() {
        let config: SignalStrengthConfig = serde_yaml::from_str("timeout: 750ms").unwrap();
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(SignalStrengthConfig::default().timeout, DEFAULT_COMMAND_TIMEOUT);
    }
}
