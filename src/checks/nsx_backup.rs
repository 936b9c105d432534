//! NSX manager backups: the per-target backup history and the policy API backup overview.

use serde::Deserialize;
use serde_json::Value;

use crate::checks::{format_time, from_epoch_millis, push_counts};
use crate::cli::{Check, CommonArgs, NoArgs};
use crate::client::{ApiClient, Auth, Transport};
use crate::credentials::Credentials;
use crate::evaluator::evaluate;
use crate::observation::{Observation, Outcome};
use crate::{CheckError, Report};

const HISTORY_PATH: &str = "/api/v1/cluster/backups/history";
const OVERVIEW_PATH: &str = "/policy/api/v1/cluster/backups/overview";

/// Backup history normalized into one observation per history entry, plus the backup targets
/// found in it.
#[derive(Debug, Default)]
pub struct BackupHistory {
    pub observations: Vec<Observation>,
    pub targets: Vec<String>,
}

fn history_entry(target: &str, index: usize, entry: &serde_json::Map<String, Value>) -> Observation {
    let timestamp = entry
        .get("end_time")
        .and_then(Value::as_i64)
        .and_then(from_epoch_millis);
    let outcome = match entry.get("success").and_then(Value::as_bool) {
        Some(success) => Outcome::from_success(success),
        None => Outcome::Unknown,
    };
    let identity = entry
        .get("backup_id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{target}#{index}"));

    let mut detail = match timestamp {
        Some(timestamp) => format!("ended {}", format_time(timestamp)),
        None => "no end time".to_owned(),
    };
    if outcome == Outcome::Failed {
        detail.push_str(", backup failed");
    }

    Observation::backup(&identity, target, outcome, timestamp).with_detail(detail)
}

/// Every list valued key is a backup target (`cluster_backup_statuses`, ...). Object values are
/// single status records, strings are informational and skipped.
pub fn history_observations(payload: &Value) -> Result<BackupHistory, CheckError> {
    let object = payload
        .as_object()
        .ok_or_else(|| CheckError::parse(HISTORY_PATH, "expected a JSON object"))?;

    let mut history = BackupHistory::default();
    for (key, value) in object {
        let target = key.trim_end_matches("_backup_statuses");

        match value {
            Value::Array(entries) => {
                history.targets.push(target.to_owned());
                for (index, entry) in entries.iter().enumerate() {
                    let entry = entry.as_object().ok_or_else(|| {
                        CheckError::parse(HISTORY_PATH, format!("{key}[{index}] is not an object"))
                    })?;
                    history
                        .observations
                        .push(history_entry(target, index, entry));
                }
            }
            Value::Object(entry) => {
                history.targets.push(target.to_owned());
                history.observations.push(history_entry(target, 0, entry));
            }
            Value::String(_) => {
                tracing::trace!(key = key.as_str(), "skipping informational value");
            }
            other => {
                return Err(CheckError::parse(
                    HISTORY_PATH,
                    format!("unexpected value for {key}: {other}"),
                ))
            }
        }
    }

    Ok(history)
}

/// Every backup target's latest backup has to be recent and successful.
pub struct NsxBackupHistory;

impl Check for NsxBackupHistory {
    const NAME: &'static str = "check_nsx_backup_history";
    const ABOUT: &'static str =
        "Check that every NSX backup target has a recent, successful latest backup";

    type Args = NoArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        _args: &NoArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let mut config = common.evaluation_config("backup targets")?;

        client.set_auth(Auth::Basic(credentials.clone()));
        let payload: Value = client.get_json(HISTORY_PATH)?;
        let history = history_observations(&payload)?;
        tracing::info!(targets = ?history.targets, "fetched backup history");

        config.latest_per_label = true;
        config.required_labels = history
            .targets
            .into_iter()
            .filter(|target| config.name_filter.matches(target))
            .collect();

        let result = evaluate(&history.observations, &config);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        push_counts(&mut report, &counts);
        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
pub struct BackupOverview {
    pub backup_operation_history: Option<OperationHistory>,
}

#[derive(Debug, Deserialize)]
pub struct OperationHistory {
    pub cluster_backup_statuses: Option<Vec<BackupStatus>>,
}

#[derive(Debug, Deserialize)]
pub struct BackupStatus {
    pub backup_id: Option<String>,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub success: Option<bool>,
}

/// Cluster backups, timestamped by their start time.
pub fn overview_observations(overview: &BackupOverview) -> Result<Vec<Observation>, CheckError> {
    let statuses = overview
        .backup_operation_history
        .as_ref()
        .and_then(|history| history.cluster_backup_statuses.as_ref())
        .ok_or_else(|| {
            CheckError::parse(
                OVERVIEW_PATH,
                "missing backup_operation_history.cluster_backup_statuses",
            )
        })?;

    Ok(statuses
        .iter()
        .enumerate()
        .map(|(index, status)| {
            let started = from_epoch_millis(status.start_time);
            let identity = status
                .backup_id
                .clone()
                .unwrap_or_else(|| format!("cluster#{index}"));
            let outcome = status
                .success
                .map(Outcome::from_success)
                .unwrap_or(Outcome::Unknown);

            let detail = match (started, status.end_time.and_then(from_epoch_millis)) {
                (Some(start), Some(end)) => {
                    format!("started {}, ended {}", format_time(start), format_time(end))
                }
                (Some(start), None) => format!("started {}", format_time(start)),
                _ => String::new(),
            };

            Observation::backup(&identity, "cluster", outcome, started).with_detail(detail)
        })
        .collect())
}

/// At least one cluster backup has to have started within the allowed age.
pub struct NsxBackupOverview;

impl Check for NsxBackupOverview {
    const NAME: &'static str = "check_nsx_backup_overview";
    const ABOUT: &'static str = "Check that the NSX cluster was backed up recently";

    type Args = NoArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        _args: &NoArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let mut config = common.evaluation_config("cluster backups")?;
        config.empty_means_stale = true;

        client.set_auth(Auth::Basic(credentials.clone()));
        let overview: BackupOverview = client.get_json(OVERVIEW_PATH)?;
        let observations = overview_observations(&overview)?;
        tracing::info!(count = observations.len(), "fetched cluster backups");

        let result = evaluate(&observations, &config);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        push_counts(&mut report, &counts);
        Ok(report)
    }
}
