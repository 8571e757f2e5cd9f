//! Probe specifications: what to run, how often, and how to treat failures.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::{Measurement, Metric, Probe, ProbeError};
use crate::scheduler::SchedulerError;

/// Minimum allowed period between ticks (100 milliseconds).
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

/// What to do when a probe invocation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum FailurePolicy {
    /// Record a diagnostic and deliver nothing for this tick.
    Propagate,
    /// Record a diagnostic and deliver the given value instead.
    Substitute(Measurement),
}

impl FailurePolicy {
    /// Substitute the zero-valued measurement of `metric` on failure.
    pub fn substitute_zero(metric: Metric) -> Self {
        Self::Substitute(Measurement::zero(metric))
    }
}

/// Configuration form of [`FailurePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    Propagate,
    SubstituteZero,
}

impl FailureMode {
    /// Resolve into a policy for the given metric.
    pub fn into_policy(self, metric: Metric) -> FailurePolicy {
        match self {
            Self::Propagate => FailurePolicy::Propagate,
            Self::SubstituteZero => FailurePolicy::substitute_zero(metric),
        }
    }
}

/// What to do when a tick fires while an earlier invocation is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Start a new invocation regardless of in-flight ones.
    #[default]
    Allow,
    /// Single-flight: skip the tick if an invocation is in flight.
    Skip,
}

/// Result of one invocation after the failure policy has been applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Invocation {
    Measured(Measurement),
    Substituted {
        value: Measurement,
        error: ProbeError,
    },
    Failed(ProbeError),
}

/// A probe bound to its schedule and policies.
///
/// Created once at startup and never mutated after being handed to the
/// scheduler.
#[derive(Clone)]
pub struct ProbeSpec {
    probe: Arc<dyn Probe>,
    period: Duration,
    on_failure: FailurePolicy,
    overlap: OverlapPolicy,
}

impl ProbeSpec {
    /// Create a spec with the default policies (propagate, allow overlap).
    pub fn new(probe: impl Probe, period: Duration) -> Self {
        Self::from_arc(Arc::new(probe), period)
    }

    /// Create a spec from a shared probe.
    pub fn from_arc(probe: Arc<dyn Probe>, period: Duration) -> Self {
        Self {
            probe,
            period,
            on_failure: FailurePolicy::Propagate,
            overlap: OverlapPolicy::Allow,
        }
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Set the overlap policy.
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn metric(&self) -> Metric {
        self.probe.metric()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn failure_policy(&self) -> &FailurePolicy {
        &self.on_failure
    }

    pub fn overlap(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Check that the spec can be scheduled.
    ///
    /// # Errors
    /// Returns `SchedulerError::InvalidSpec` if the period is below
    /// [`MIN_PERIOD`] or the substitute value belongs to another metric.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let metric = self.metric();
        if self.period < MIN_PERIOD {
            return Err(SchedulerError::InvalidSpec {
                metric,
                reason: format!(
                    "period {:?} is below the minimum of {:?}",
                    self.period, MIN_PERIOD
                ),
            });
        }
        if let FailurePolicy::Substitute(value) = &self.on_failure {
            if value.metric() != metric {
                return Err(SchedulerError::InvalidSpec {
                    metric,
                    reason: format!("substitute value belongs to metric '{}'", value.metric()),
                });
            }
        }
        Ok(())
    }

    /// Run the probe once and apply the failure policy.
    pub async fn run_once(&self) -> Result<Measurement, ProbeError> {
        match self.invoke().await {
            Invocation::Measured(value) | Invocation::Substituted { value, .. } => Ok(value),
            Invocation::Failed(e) => Err(e),
        }
    }

    pub(crate) async fn invoke(&self) -> Invocation {
        match self.probe.measure().await {
            Ok(value) => Invocation::Measured(value),
            Err(error) => match &self.on_failure {
                FailurePolicy::Propagate => Invocation::Failed(error),
                FailurePolicy::Substitute(value) => Invocation::Substituted {
                    value: value.clone(),
                    error,
                },
            },
        }
    }
}

impl std::fmt::Debug for ProbeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSpec")
            .field("metric", &self.metric())
            .field("period", &self.period)
            .field("on_failure", &self.on_failure)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PacketLoss;

    struct FailingProbe(Metric);

    #[async_trait::async_trait]
    impl Probe for FailingProbe {
        fn metric(&self) -> Metric {
            self.0
        }

        async fn measure(&self) -> Result<Measurement, ProbeError> {
            Err(ProbeError::Network("unreachable".to_string()))
        }
    }

    #[test]
    fn test_spec_defaults() {
        let spec = ProbeSpec::new(FailingProbe(Metric::PacketLoss), Duration::from_secs(10));
        assert_eq!(spec.metric(), Metric::PacketLoss);
        assert_eq!(spec.period(), Duration::from_secs(10));
        assert_eq!(spec.failure_policy(), &FailurePolicy::Propagate);
        assert_eq!(spec.overlap(), OverlapPolicy::Allow);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_period() {
        let spec = ProbeSpec::new(FailingProbe(Metric::PacketLoss), Duration::from_millis(10));
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("below the minimum"));
    }

    #[test]
    fn test_validate_rejects_mismatched_substitute() {
        let spec = ProbeSpec::new(FailingProbe(Metric::Bandwidth), Duration::from_secs(10))
            .with_failure_policy(FailurePolicy::Substitute(Measurement::PacketLoss(
                PacketLoss { percent: 0.0 },
            )));
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("packet_loss"));
    }

    #[tokio::test]
    async fn test_run_once_propagates_failure() {
        let spec = ProbeSpec::new(FailingProbe(Metric::PacketLoss), Duration::from_secs(10));
        let result = spec.run_once().await;
        assert_eq!(
            result,
            Err(ProbeError::Network("unreachable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_run_once_substitutes_on_failure() {
        let spec = ProbeSpec::new(FailingProbe(Metric::Bandwidth), Duration::from_secs(10))
            .with_failure_policy(FailurePolicy::substitute_zero(Metric::Bandwidth));
        let value = spec.run_once().await.unwrap();
        assert_eq!(value, Measurement::zero(Metric::Bandwidth));

        match spec.invoke().await {
            Invocation::Substituted { error, .. } => {
                assert!(error.to_string().contains("unreachable"));
            }
            other => panic!("expected substitution, got {other:?}"),
        }
    }
}
