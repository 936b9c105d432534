//! Last results of the backup server's jobs.

use serde::Deserialize;

use crate::checks::{format_time, parse_timestamp, push_counts};
use crate::cli::{Check, CommonArgs};
use crate::client::{ApiClient, Transport};
use crate::credentials::Credentials;
use crate::evaluator::evaluate;
use crate::observation::{Observation, Outcome};
use crate::{CheckError, Report};

const JOB_STATES_PATH: &str = "/api/v1/jobs/states";

#[derive(Debug, Clone, Default, clap::Args)]
pub struct JobsArgs {
    /// Turn CRITICAL when no job ran within --max-age-hours
    #[arg(long)]
    pub require_recent: bool,
    /// Also evaluate disabled jobs
    #[arg(long)]
    pub include_disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct JobStates {
    #[serde(default)]
    pub data: Vec<JobState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub id: String,
    pub name: String,
    pub last_result: Option<String>,
    pub last_run: Option<String>,
    #[serde(default)]
    pub is_disabled: bool,
}

pub fn observations(
    states: &JobStates,
    include_disabled: bool,
) -> Result<Vec<Observation>, CheckError> {
    let mut observations = Vec::with_capacity(states.data.len());

    for job in &states.data {
        if job.is_disabled && !include_disabled {
            tracing::debug!(job = job.name.as_str(), "skipping disabled job");
            continue;
        }

        let last_run = job
            .last_run
            .as_deref()
            .map(|value| parse_timestamp(value, JOB_STATES_PATH))
            .transpose()?;
        let outcome = job
            .last_result
            .as_deref()
            .map(Outcome::from_job_result)
            .unwrap_or(Outcome::Unknown);
        let detail = match last_run {
            Some(last_run) => format!("last run {}", format_time(last_run)),
            None => "never ran".to_owned(),
        };

        observations
            .push(Observation::job(&job.id, &job.name, outcome, last_run).with_detail(detail));
    }

    Ok(observations)
}

/// CRITICAL for failed, WARNING for warning job results among the recent runs.
pub struct VeeamJobs;

impl Check for VeeamJobs {
    const NAME: &'static str = "check_veeam_jobs";
    const ABOUT: &'static str = "Check the last results of the backup server's jobs";

    type Args = JobsArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        args: &JobsArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let mut config = common.evaluation_config("backup jobs")?;
        config.empty_means_stale = args.require_recent;

        client.set_api_version(Some(&common.api_version));
        client.login_oauth2(credentials)?;
        let states: JobStates = client.get_json(JOB_STATES_PATH)?;
        tracing::info!(count = states.data.len(), "fetched job states");

        let result = evaluate(&observations(&states, args.include_disabled)?, &config);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        push_counts(&mut report, &counts);
        Ok(report)
    }
}
