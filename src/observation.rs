use std::fmt;

use chrono::{DateTime, Utc};

/// The family an [Observation] belongs to. It decides which classification rule applies; rules
/// are never applied across kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Alarm,
    Backup,
    Job,
    Capacity,
}

impl ObservationKind {
    /// Backups and jobs are subject to name and age filtering, alarms and capacity readings are
    /// not.
    pub fn is_filtered(&self) -> bool {
        matches!(self, ObservationKind::Backup | ObservationKind::Job)
    }
}

/// Normalized result of a single record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Warning,
    Failed,
    Open,
    Closed,
    Unknown,
}

impl Outcome {
    /// Normalizes a job result as reported by the backup platform (`Success`, `Warning`,
    /// `Failed`, `None`, ...).
    pub fn from_job_result(result: &str) -> Self {
        match result.to_ascii_lowercase().as_str() {
            "success" => Outcome::Success,
            "warning" => Outcome::Warning,
            "failed" => Outcome::Failed,
            _ => Outcome::Unknown,
        }
    }

    /// Normalizes a boolean `success` flag.
    pub fn from_success(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }

    /// Normalizes an alarm status (`OPEN`, `ACKNOWLEDGED`, `SUPPRESSED`, `RESOLVED`).
    ///
    /// Only `OPEN` counts as open.
    pub fn from_alarm_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case("open") {
            Outcome::Open
        } else {
            Outcome::Closed
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "Success",
            Outcome::Warning => "Warning",
            Outcome::Failed => "Failed",
            Outcome::Open => "OPEN",
            Outcome::Closed => "CLOSED",
            Outcome::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlarmSeverity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl AlarmSeverity {
    pub fn parse(severity: &str) -> Self {
        match severity.to_ascii_uppercase().as_str() {
            "CRITICAL" => AlarmSeverity::Critical,
            "HIGH" => AlarmSeverity::High,
            "MEDIUM" => AlarmSeverity::Medium,
            "LOW" => AlarmSeverity::Low,
            _ => AlarmSeverity::Unknown,
        }
    }
}

impl fmt::Display for AlarmSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmSeverity::Critical => "CRITICAL",
            AlarmSeverity::High => "HIGH",
            AlarmSeverity::Medium => "MEDIUM",
            AlarmSeverity::Low => "LOW",
            AlarmSeverity::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Size and free space of a storage target, both in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityMetrics {
    pub capacity_bytes: u64,
    pub free_bytes: u64,
}

impl CapacityMetrics {
    pub fn used_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.free_bytes)
    }

    /// Used space in percent of the capacity. A zero capacity is reported as 0%.
    pub fn used_percent(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 * 100.0 / self.capacity_bytes as f64
    }
}

/// One evaluated unit: an alarm, a backup run, a job run or a capacity reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub identity: String,
    pub label: String,
    pub kind: ObservationKind,
    pub outcome: Outcome,
    /// Vendor severity, only set for alarms.
    pub severity: Option<AlarmSeverity>,
    pub timestamp: Option<DateTime<Utc>>,
    pub detail: String,
    pub metrics: Option<CapacityMetrics>,
}

impl Observation {
    fn new(identity: &str, label: &str, kind: ObservationKind, outcome: Outcome) -> Self {
        Observation {
            identity: identity.to_owned(),
            label: label.to_owned(),
            kind,
            outcome,
            severity: None,
            timestamp: None,
            detail: String::new(),
            metrics: None,
        }
    }

    pub fn alarm(identity: &str, label: &str, outcome: Outcome, severity: AlarmSeverity) -> Self {
        let mut observation = Observation::new(identity, label, ObservationKind::Alarm, outcome);
        observation.severity = Some(severity);
        observation
    }

    pub fn backup(
        identity: &str,
        label: &str,
        outcome: Outcome,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut observation = Observation::new(identity, label, ObservationKind::Backup, outcome);
        observation.timestamp = timestamp;
        observation
    }

    pub fn job(
        identity: &str,
        label: &str,
        outcome: Outcome,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let mut observation = Observation::new(identity, label, ObservationKind::Job, outcome);
        observation.timestamp = timestamp;
        observation
    }

    pub fn capacity(identity: &str, label: &str, metrics: CapacityMetrics) -> Self {
        let mut observation =
            Observation::new(identity, label, ObservationKind::Capacity, Outcome::Unknown);
        observation.metrics = Some(metrics);
        observation
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Outcome as shown in findings. Alarms carry their vendor severity along, capacity
    /// readings show the used percentage.
    pub fn outcome_display(&self) -> String {
        match (self.severity, self.metrics) {
            (Some(severity), _) => format!("{}/{}", self.outcome, severity),
            (None, Some(metrics)) => format!("{:.2}% used", metrics.used_percent()),
            (None, None) => self.outcome.to_string(),
        }
    }
}
