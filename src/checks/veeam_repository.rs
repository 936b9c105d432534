//! Used space of backup repositories, read from the Enterprise Manager repository report.

use serde::Deserialize;

use crate::checks::push_counts;
use crate::cli::{Check, CommonArgs, NoArgs};
use crate::client::{ApiClient, Transport};
use crate::credentials::Credentials;
use crate::evaluator::evaluate;
use crate::observation::{CapacityMetrics, Observation};
use crate::{CheckError, PerfData, Report, Unit};

const REPORT_PATH: &str = "/api/reports/summary/repository";
const NAMESPACE: &str = "http://www.veeam.com/ent/v1.0";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One repository of the summary report.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Period {
    pub name: String,
    pub capacity: u64,
    pub free_space: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RepositoryReport {
    #[serde(default)]
    periods: Vec<Period>,
}

fn xml_child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Result<&'a str, CheckError> {
    node.children()
        .find(|child| child.has_tag_name((NAMESPACE, name)))
        .and_then(|child| child.text())
        .map(str::trim)
        .ok_or_else(|| CheckError::parse(REPORT_PATH, format!("Period without {name}")))
}

fn xml_number(node: roxmltree::Node, name: &str) -> Result<u64, CheckError> {
    let value = xml_child(node, name)?;
    value
        .parse()
        .map_err(|e| CheckError::parse(REPORT_PATH, format!("invalid {name} '{value}': {e}")))
}

fn parse_xml(body: &str) -> Result<Vec<Period>, CheckError> {
    let document =
        roxmltree::Document::parse(body).map_err(|e| CheckError::parse(REPORT_PATH, e))?;

    document
        .descendants()
        .filter(|node| node.has_tag_name((NAMESPACE, "Period")))
        .map(|node| -> Result<Period, CheckError> {
            Ok(Period {
                name: xml_child(node, "Name")?.to_owned(),
                capacity: xml_number(node, "Capacity")?,
                free_space: xml_number(node, "FreeSpace")?,
            })
        })
        .collect()
}

/// Parses the repository report. The Enterprise Manager answers with JSON or XML depending on
/// its version, so JSON is tried first.
pub fn parse_report(body: &str) -> Result<Vec<Period>, CheckError> {
    let periods = match serde_json::from_str::<RepositoryReport>(body) {
        Ok(report) => report.periods,
        Err(json_error) => {
            tracing::debug!(%json_error, "repository report is not JSON, trying XML");
            parse_xml(body)?
        }
    };

    if let Some(period) = periods.iter().find(|p| p.capacity == 0) {
        return Err(CheckError::parse(
            REPORT_PATH,
            format!("repository '{}' reports zero capacity", period.name),
        ));
    }

    Ok(periods)
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

fn summary(period: &Period, metrics: &CapacityMetrics) -> String {
    format!(
        "{:.2}GB of {:.2}GB, {:.2}GB free",
        gib(metrics.used_bytes()),
        gib(period.capacity),
        gib(period.free_space)
    )
}

pub fn observations(periods: &[Period]) -> Vec<Observation> {
    periods
        .iter()
        .map(|period| {
            let metrics = CapacityMetrics {
                capacity_bytes: period.capacity,
                free_bytes: period.free_space,
            };
            Observation::capacity(&period.name, &period.name, metrics)
                .with_detail(summary(period, &metrics))
        })
        .collect()
}

/// WARNING or CRITICAL when a repository's used space reaches the levels.
pub struct VeeamRepository;

impl Check for VeeamRepository {
    const NAME: &'static str = "check_veeam_repository";
    const ABOUT: &'static str = "Check the used space of backup repositories";

    type Args = NoArgs;

    fn run<T: Transport>(
        common: &CommonArgs,
        _args: &NoArgs,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError> {
        let config = common.evaluation_config("repositories")?;

        client.login_session(credentials)?;
        let periods = parse_report(&client.get_text(REPORT_PATH)?)?;
        tracing::info!(count = periods.len(), "fetched repository report");

        let selected: Vec<Period> = periods
            .into_iter()
            .filter(|p| config.name_filter.matches(&p.name))
            .collect();
        if selected.is_empty() {
            let message = match &common.name_filter {
                Some(name) => format!("repository '{name}' not found"),
                None => "report lists no repositories".to_owned(),
            };
            return Err(CheckError::parse(REPORT_PATH, message));
        }

        let observations = observations(&selected);
        let result = evaluate(&observations, &config);
        let counts = result.counts;

        let mut report = Report::from_evaluation(result);
        if let [observation] = observations.as_slice() {
            if let Some(metrics) = observation.metrics {
                report.set_description(&format!(
                    "{}: {:.2}% used ({})",
                    observation.label,
                    metrics.used_percent(),
                    observation.detail
                ));
            }
        }

        for observation in &observations {
            if let Some(metrics) = observation.metrics {
                report.push_perf_data(
                    PerfData::new(&observation.label, metrics.used_percent())
                        .with_unit(Unit::Percentage)
                        .with_levels(config.levels.warning, config.levels.critical)
                        .with_bounds(0.0, 100.0),
                );
            }
        }
        push_counts(&mut report, &counts);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::common_args;
    use crate::client::fake::FakeTransport;
    use crate::client::{Auth, Method};
    use crate::ServiceState;

    const GB: u64 = 1024 * 1024 * 1024;

    const XML_REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<RepositoryReportFrame xmlns="http://www.veeam.com/ent/v1.0" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <Period>
    <Name>Main Repo</Name>
    <Capacity>1073741824000</Capacity>
    <FreeSpace>107374182400</FreeSpace>
    <BackupSize>900000000000</BackupSize>
  </Period>
  <Period>
    <Name>Offsite</Name>
    <Capacity>1073741824000</Capacity>
    <FreeSpace>536870912000</FreeSpace>
  </Period>
</RepositoryReportFrame>"#;

    fn json_report() -> String {
        format!(
            r#"{{"Periods": [
                {{"Name": "Main Repo", "Capacity": {}, "FreeSpace": {}}},
                {{"Name": "Offsite", "Capacity": {}, "FreeSpace": {}}}
            ]}}"#,
            1000 * GB,
            150 * GB,
            1000 * GB,
            500 * GB,
        )
    }

    fn client(body: &str) -> ApiClient<FakeTransport> {
        let transport = FakeTransport::new()
            .on_with_headers(
                Method::Post,
                "/api/sessionMngr/?v=latest",
                201,
                "",
                &[("X-RestSvcSessionId", "session-1")],
            )
            .on(Method::Get, REPORT_PATH, 200, body);
        ApiClient::new(transport, "https://em:9398")
    }

    fn credentials() -> Credentials {
        Credentials::new("CORP\\monitor", "secret")
    }

    #[test]
    fn test_parse_json_report() -> anyhow::Result<()> {
        let periods = parse_report(&json_report())?;
        assert_eq!(
            periods[0],
            Period {
                name: "Main Repo".to_owned(),
                capacity: 1000 * GB,
                free_space: 150 * GB,
            }
        );
        assert_eq!(periods.len(), 2);
        Ok(())
    }

    #[test]
    fn test_parse_xml_report() -> anyhow::Result<()> {
        let periods = parse_report(XML_REPORT)?;
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].name, "Main Repo");
        assert_eq!(periods[0].capacity, 1000 * GB);
        assert_eq!(periods[0].free_space, 100 * GB);
        assert_eq!(periods[1].name, "Offsite");
        Ok(())
    }

    #[test]
    fn test_parse_report_errors() {
        assert!(matches!(
            parse_report("Service Unavailable"),
            Err(CheckError::Parse { .. })
        ));
        assert!(matches!(
            parse_report(r#"{"Periods": [{"Name": "x", "Capacity": 0, "FreeSpace": 0}]}"#),
            Err(CheckError::Parse { .. })
        ));
        assert!(matches!(
            parse_report(
                r#"<Frame xmlns="http://www.veeam.com/ent/v1.0"><Period><Name>x</Name><Capacity>lots</Capacity><FreeSpace>1</FreeSpace></Period></Frame>"#
            ),
            Err(CheckError::Parse { .. })
        ));
    }

    #[test]
    fn test_run_single_repository() -> anyhow::Result<()> {
        let mut client = client(&json_report());

        let report = VeeamRepository::run(
            &common_args(&["--name-filter", "main repo", "--filter-mode", "exact"]),
            &NoArgs {},
            &credentials(),
            &mut client,
        )?;

        assert_eq!(report.state(), ServiceState::Warning);
        assert_eq!(
            report.to_nagios_string(),
            "WARNING: Main Repo: 85.00% used (850.00GB of 1000.00GB, 150.00GB free) \
             | 'Main Repo'=85%;80;90;0;100 count_critical=0 count_warning=1 count_ok=0\n\
             Warning (1):\n\
             \x20- Main Repo [85.00% used] Main Repo: 850.00GB of 1000.00GB, 150.00GB free\n\
             OK: 0"
        );

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].auth, Auth::Basic(credentials()));
        assert_eq!(
            requests[1].auth,
            Auth::Session {
                header: "X-RestSvcSessionId".to_owned(),
                id: "session-1".to_owned(),
            }
        );
        Ok(())
    }

    #[test]
    fn test_run_all_repositories() -> anyhow::Result<()> {
        let mut client = client(XML_REPORT);

        let report = VeeamRepository::run(
            &common_args(&["--warning-pct", "40", "--critical-pct", "90"]),
            &NoArgs {},
            &credentials(),
            &mut client,
        )?;

        assert_eq!(report.state(), ServiceState::Critical);
        assert_eq!(
            report.description(),
            Some("1 critical, 1 warning, 0 ok repositories")
        );
        assert_eq!(report.perf_data().len(), 5);
        Ok(())
    }

    #[test]
    fn test_run_single_repository_with_separator_in_name() -> anyhow::Result<()> {
        let body = format!(
            r#"{{"Periods": [{{"Name": "Main | Repo", "Capacity": {}, "FreeSpace": {}}}]}}"#,
            1000 * GB,
            500 * GB,
        );
        let mut client = client(&body);

        let report = VeeamRepository::run(&common_args(&[]), &NoArgs {}, &credentials(), &mut client)?;

        let output = report.to_nagios_string();
        assert!(output.starts_with("OK: Main / Repo: 50.00% used (500.00GB of 1000.00GB"));
        assert_eq!(output.matches('|').count(), 1);
        assert!(output.contains(" | 'Main / Repo'=50%;80;90;0;100 "));
        Ok(())
    }

    #[test]
    fn test_run_unknown_repository() {
        let mut client = client(&json_report());

        let err = VeeamRepository::run(
            &common_args(&["--name-filter", "tape"]),
            &NoArgs {},
            &credentials(),
            &mut client,
        )
        .unwrap_err();
        assert!(err.to_string().contains("repository 'tape' not found"));
        assert_eq!(err.state(), ServiceState::Unknown);
    }

    #[test]
    fn test_run_without_session_header() {
        let transport = FakeTransport::new().on(Method::Post, "/api/sessionMngr/?v=latest", 201, "");
        let mut client = ApiClient::new(transport, "https://em:9398");

        let err = VeeamRepository::run(&common_args(&[]), &NoArgs {}, &credentials(), &mut client)
            .unwrap_err();
        assert!(matches!(err, CheckError::Transport(_)));
    }
}
