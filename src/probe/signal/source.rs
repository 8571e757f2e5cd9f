//! Platform signal strength sources.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::command::CommandRunner;
use crate::probe::{ProbeError, SignalStrength, SignalUnit};

const NETSH: &str = "netsh";
const NETSH_ARGS: &[&str] = &["wlan", "show", "interfaces"];

const AIRPORT: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";
const AIRPORT_ARGS: &[&str] = &["-I"];

fn netsh_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Signal\s*:\s*(\d+)%").expect("failed to compile netsh signal regex")
    })
}

fn airport_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"agrCtlRSSI:\s*(-?\d+)").expect("failed to compile airport RSSI regex")
    })
}

/// A way of reading wireless signal strength on the current platform.
#[async_trait::async_trait]
pub trait SignalSource: Send + Sync + 'static {
    /// Whether this source can ever produce a reading.
    fn supported(&self) -> bool;

    /// Read the current signal strength.
    async fn query(&self) -> Result<SignalStrength, ProbeError>;
}

/// Signal source that runs a platform tool and extracts the value from its
/// text output.
pub struct CommandSource {
    program: &'static str,
    args: &'static [&'static str],
    pattern: &'static Regex,
    unit: SignalUnit,
    runner: Arc<dyn CommandRunner>,
}

impl CommandSource {
    /// Windows: `netsh wlan show interfaces`, signal quality in percent.
    pub fn netsh(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: NETSH,
            args: NETSH_ARGS,
            pattern: netsh_pattern(),
            unit: SignalUnit::Percent,
            runner,
        }
    }

    /// macOS: `airport -I`, RSSI in dBm.
    pub fn airport(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: AIRPORT,
            args: AIRPORT_ARGS,
            pattern: airport_pattern(),
            unit: SignalUnit::Dbm,
            runner,
        }
    }

    /// Extract the signal value from command output.
    pub fn parse(&self, stdout: &str) -> Result<SignalStrength, ProbeError> {
        let value = self
            .pattern
            .captures(stdout)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| ProbeError::Parse("signal strength not found".to_string()))?
            .as_str()
            .parse::<i32>()
            .map_err(|e| ProbeError::Parse(format!("invalid signal value: {e}")))?;

        Ok(SignalStrength {
            value,
            unit: self.unit,
        })
    }
}

impl std::fmt::Debug for CommandSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSource")
            .field("program", &self.program)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SignalSource for CommandSource {
    fn supported(&self) -> bool {
        true
    }

    async fn query(&self) -> Result<SignalStrength, ProbeError> {
        let output = self.runner.run(self.program, self.args).await?;
        if !output.success {
            return Err(ProbeError::Command(format!(
                "{} exited with an error: {}",
                self.program,
                output.stderr.trim()
            )));
        }
        if !output.stderr.trim().is_empty() {
            return Err(ProbeError::Command(format!("stderr: {}", output.stderr.trim())));
        }
        self.parse(&output.stdout)
    }
}

/// Signal source for platforms without a known tool. Always fails.
#[derive(Debug, Clone)]
pub struct UnsupportedSource {
    os: String,
}

impl UnsupportedSource {
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }
}

#[async_trait::async_trait]
impl SignalSource for UnsupportedSource {
    fn supported(&self) -> bool {
        false
    }

    async fn query(&self) -> Result<SignalStrength, ProbeError> {
        Err(ProbeError::UnsupportedPlatform(self.os.clone()))
    }
}

/// Pick the signal source for an operating system name as reported by
/// `std::env::consts::OS`.
pub fn source_for_os(os: &str, runner: Arc<dyn CommandRunner>) -> Box<dyn SignalSource> {
    match os {
        "windows" => Box::new(CommandSource::netsh(runner)),
        "macos" => Box::new(CommandSource::airport(runner)),
        other => Box::new(UnsupportedSource::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::signal::command::{CommandOutput, SystemCommandRunner};

    const NETSH_OUTPUT: &str = "\
There is 1 interface on the system:

    Name                   : Wi-Fi
    State                  : connected
    SSID                   : home
    Radio type             : 802.11ac
    Receive rate (Mbps)    : 866.7
    Transmit rate (Mbps)   : 866.7
    Signal                 : 92%
    Profile                : home
";

    const AIRPORT_OUTPUT: &str = "\
     agrCtlRSSI: -58
     agrExtRSSI: 0
    agrCtlNoise: -92
          state: running
        lastTxRate: 702
";

    #[test]
    fn test_parse_netsh_percent() {
        let source = CommandSource::netsh(Arc::new(SystemCommandRunner));
        let reading = source.parse(NETSH_OUTPUT).unwrap();
        assert_eq!(reading.value, 92);
        assert_eq!(reading.unit, SignalUnit::Percent);
    }

    #[test]
    fn test_parse_airport_rssi() {
        let source = CommandSource::airport(Arc::new(SystemCommandRunner));
        let reading = source.parse(AIRPORT_OUTPUT).unwrap();
        assert_eq!(reading.value, -58);
        assert_eq!(reading.unit, SignalUnit::Dbm);
    }

    #[test]
    fn test_parse_missing_value() {
        let source = CommandSource::netsh(Arc::new(SystemCommandRunner));
        let err = source.parse("State : disconnected").unwrap_err();
        assert_eq!(err, ProbeError::Parse("signal strength not found".to_string()));
    }

    #[test]
    fn test_source_for_os() {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        assert!(source_for_os("windows", runner.clone()).supported());
        assert!(source_for_os("macos", runner.clone()).supported());
        assert!(!source_for_os("linux", runner.clone()).supported());
        assert!(!source_for_os("freebsd", runner).supported());
    }

    #[tokio::test]
    async fn test_unsupported_always_fails() {
        let source = UnsupportedSource::new("linux");
        for _ in 0..3 {
            let err = source.query().await.unwrap_err();
            assert_eq!(err.to_string(), "unsupported platform: linux");
        }
    }

    #[test]
    fn test_command_output_default_is_failure() {
        assert!(!CommandOutput::default().success);
    }
}
