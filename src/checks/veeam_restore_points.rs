//! Restore points per protected machine: the latest one has to be recent, malware free and
//! belong to a backup the server still knows about.

use chrono::Utc;
use serde::Deserialize;

use crate::checks::{format_time, parse_timestamp, push_counts};
use crate::cli::{Check, CommonArgs, NoArgs};
use crate::client::{ApiClient, Transport};
use crate::credentials::Credentials;
use crate::evaluator::{evaluate_at, filter_at};
use crate::observation::{Observation, Outcome};
use crate::{CheckError, Report};

const RESTORE_POINTS_PATH: &str = "/api/v1/restorePoints";

#[derive(Debug, Deserialize)]
pub struct RestorePoints {
    #[serde(default)]
    pub data: Vec<RestorePoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePoint {
    pub id: String,
    pub name: String,
    pub creation_time: String,
    pub malware_status: Option<String>,
    pub backup_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackupDetails {
    id: String,
}

fn outcome(malware_status: Option<&str>) -> Outcome {
    match malware_status {
        Some(status) if status.eq_ignore_ascii_case("clean") => Outcome::Success,
        Some(_) => Outcome::Failed,
        None => Outcome::Unknown,
    }
}

/// One backup observation per restore point, labelled with the machine name.
pub fn observations(points: &RestorePoints) -> Result<Vec<Observation>, CheckError> {
    points
        .data
        .iter()
        .map(|point| -> Result<Observation, CheckError> {
            let created = parse_timestamp(&point.creation_time, RESTORE_POINTS_PATH)?;
            let mut detail = format!("created {}", format_time(created));
            if let Some(status) = point
                .malware_status
                .as_deref()
                .filter(|s| !s.eq_ignore_ascii_case("clean"))
            {
                detail.push_str(&format!(", malware status {status}"));
            }

            Ok(Observation::backup(
                &point.id,
                &point.name,
                outcome(point.malware_status.as_deref()),
                Some(created),
            )
            .with_detail(detail))
        })
        .collect()
}

pub struct VeeamRestorePoints;

impl Check for VeeamRestorePoints {
    const NAME: &'static str = "check_veeam_restore_points";
    const ABOUT: &'static str =
        "Check that the latest restore point of every machine is recent and malware free";

    type Args = NoArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        _args: &NoArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let mut config = common.evaluation_config("restore points")?;
        config.latest_per_label = true;

        client.set_api_version(Some(&common.api_version));
        client.login_oauth2(credentials)?;
        let points: RestorePoints = client.get_json(RESTORE_POINTS_PATH)?;
        tracing::info!(count = points.data.len(), "fetched restore points");

        // Every machine with a restore point needs a recent one.
        for point in &points.data {
            if config.name_filter.matches(&point.name)
                && !config.required_labels.contains(&point.name)
            {
                config.required_labels.push(point.name.clone());
            }
        }
        config.empty_means_stale = config.required_labels.is_empty();

        let observations = observations(&points)?;
        let now = Utc::now();

        for latest in filter_at(&observations, &config, now).retained {
            let Some(point) = points.data.iter().find(|p| p.id == latest.identity) else {
                continue;
            };
            let backup_id = point.backup_id.as_deref().ok_or_else(|| {
                CheckError::parse(
                    RESTORE_POINTS_PATH,
                    format!("restore point {} has no backupId", point.id),
                )
            })?;

            let backup: BackupDetails = client.get_json(&format!("/api/v1/backups/{backup_id}"))?;
            tracing::debug!(machine = point.name.as_str(), backup = backup.id.as_str(), "backup exists");
        }

        let result = evaluate_at(&observations, &config, now);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        push_counts(&mut report, &counts);
        Ok(report)
    }
}
