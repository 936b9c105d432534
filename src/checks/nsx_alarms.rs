//! Open alarms of an NSX manager.

use serde::Deserialize;

use crate::checks::push_counts;
use crate::cli::{Check, CommonArgs, NoArgs};
use crate::client::{ApiClient, Auth, Transport};
use crate::credentials::Credentials;
use crate::evaluator::evaluate;
use crate::observation::{AlarmSeverity, Observation, Outcome};
use crate::{CheckError, Report};

const ALARMS_PATH: &str = "/api/v1/alarms";

#[derive(Debug, Deserialize)]
pub struct AlarmList {
    #[serde(default)]
    pub results: Vec<Alarm>,
}

#[derive(Debug, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub status: String,
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub feature_name: Option<String>,
    pub event_type: Option<String>,
}

impl Alarm {
    fn label(&self) -> &str {
        self.event_type
            .as_deref()
            .or(self.feature_name.as_deref())
            .unwrap_or(&self.id)
    }

    fn detail(&self) -> String {
        match (self.summary.trim(), self.description.trim()) {
            ("", description) => description.to_owned(),
            (summary, "") => summary.to_owned(),
            (summary, description) => format!("{summary} ({description})"),
        }
    }
}

pub fn observations(alarms: &AlarmList) -> Vec<Observation> {
    alarms
        .results
        .iter()
        .map(|alarm| {
            Observation::alarm(
                &alarm.id,
                alarm.label(),
                Outcome::from_alarm_status(&alarm.status),
                AlarmSeverity::parse(&alarm.severity),
            )
            .with_detail(alarm.detail())
        })
        .collect()
}

/// CRITICAL for any open critical alarm, WARNING for open high or medium alarms.
pub struct NsxAlarms;

impl Check for NsxAlarms {
    const NAME: &'static str = "check_nsx_alarms";
    const ABOUT: &'static str = "Check an NSX manager for open critical, high and medium alarms";

    type Args = NoArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        _args: &NoArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let config = common.evaluation_config("alarms")?;

        client.set_auth(Auth::Basic(credentials.clone()));
        let alarms: AlarmList = client.get_json(ALARMS_PATH)?;
        tracing::info!(count = alarms.results.len(), "fetched alarms");

        let result = evaluate(&observations(&alarms), &config);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        push_counts(&mut report, &counts);
        Ok(report)
    }
}
