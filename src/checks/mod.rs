//! The checks. Each module fetches one resource, normalizes it into observations and evaluates
//! them.

use chrono::{DateTime, Utc};

use crate::evaluator::BucketCounts;
use crate::{CheckError, PerfData, Report};

pub mod nsx_alarms;
pub mod nsx_backup;
pub mod veeam_jobs;
pub mod veeam_repository;
pub mod veeam_restore_points;

pub use nsx_alarms::NsxAlarms;
pub use nsx_backup::{NsxBackupHistory, NsxBackupOverview};
pub use veeam_jobs::VeeamJobs;
pub use veeam_repository::VeeamRepository;
pub use veeam_restore_points::VeeamRestorePoints;

/// Parses an RFC 3339 timestamp as returned by the backup server REST API
/// (`2024-05-01T10:00:00.1234567+02:00`).
pub(crate) fn parse_timestamp(value: &str, context: &str) -> Result<DateTime<Utc>, CheckError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CheckError::parse(context, format!("invalid timestamp '{value}': {e}")))
}

/// Converts epoch milliseconds as used by the NSX API.
pub(crate) fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

pub(crate) fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Adds the bucket sizes as performance data. The labels are prefixed so they cannot clash with
/// per-item labels such as repository names.
pub(crate) fn push_counts(report: &mut Report, counts: &BucketCounts) {
    for (label, value) in [
        ("count_critical", counts.critical),
        ("count_warning", counts.warning),
        ("count_ok", counts.ok),
    ] {
        report.push_perf_data(PerfData::new(label, value as f64));
    }
}
