//! The infracheck crate provides monitoring checks for the REST APIs of a network virtualization
//! platform (NSX) and a backup platform (Veeam), following the nagios plugin convention: one
//! status line on stdout plus an exit code.
//!
//! Every check fetches records, normalizes them into [Observation]s and hands them to
//! [evaluate], which aggregates a single [ServiceState] and an ordered list of findings.
//!
//! ```rust
//! # use infracheck::{evaluate, EvaluationConfig, Observation, Outcome, AlarmSeverity, ServiceState};
//! let alarms = vec![
//!     Observation::alarm("a1", "edge", Outcome::Open, AlarmSeverity::Critical),
//!     Observation::alarm("a2", "edge", Outcome::Closed, AlarmSeverity::Critical),
//! ];
//! let result = evaluate(&alarms, &EvaluationConfig::default());
//! assert_eq!(result.severity, ServiceState::Critical);
//! assert_eq!(result.exit_code(), 2);
//! ```

use std::fmt;

pub mod checks;
pub mod cli;
pub mod client;
pub mod config_generator;
pub mod credentials;
pub mod error;
pub mod evaluator;
pub mod observation;
pub mod report;
pub mod runner;

pub use crate::error::CheckError;
pub use crate::evaluator::{
    evaluate, evaluate_at, filter_at, Bucket, BucketCounts, EvaluationConfig, EvaluationResult,
    FilterMode, Filtered, Levels, NameFilter,
};
pub use crate::observation::{
    AlarmSeverity, CapacityMetrics, Observation, ObservationKind, Outcome,
};
pub use crate::report::{PerfData, Report, Unit};
pub use crate::runner::{Runner, RunnerResult};

/// Represents a service state from nagios.
///
/// The ordering is `Unknown < Ok < Warning < Critical`, so the worst classified state of a set
/// is simply its maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceState {
    Unknown,
    Ok,
    Warning,
    Critical,
}

impl ServiceState {
    /// Returns the corresponding nagios exit code to signal the service state of self.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceState::Ok => 0,
            ServiceState::Warning => 1,
            ServiceState::Critical => 2,
            ServiceState::Unknown => 3,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Ok => "OK",
            ServiceState::Warning => "WARNING",
            ServiceState::Critical => "CRITICAL",
            ServiceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use crate::ServiceState;

    #[test]
    fn test_state() {
        assert_eq!(ServiceState::Ok.exit_code(), 0);
        assert_eq!(ServiceState::Warning.exit_code(), 1);
        assert_eq!(ServiceState::Critical.exit_code(), 2);
        assert_eq!(ServiceState::Unknown.exit_code(), 3);

        assert_eq!(&ServiceState::Ok.to_string(), "OK");
        assert_eq!(&ServiceState::Warning.to_string(), "WARNING");
        assert_eq!(&ServiceState::Critical.to_string(), "CRITICAL");
        assert_eq!(&ServiceState::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_state_ordering() {
        assert!(ServiceState::Critical > ServiceState::Warning);
        assert!(ServiceState::Warning > ServiceState::Ok);
        assert!(ServiceState::Ok > ServiceState::Unknown);

        let worst = [ServiceState::Ok, ServiceState::Critical, ServiceState::Warning]
            .into_iter()
            .max();
        assert_eq!(worst, Some(ServiceState::Critical));
    }
}
