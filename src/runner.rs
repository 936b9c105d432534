use std::fmt::Display;

use crate::report::sanitize;
use crate::{CheckError, Report, ServiceState};

pub struct Runner<E> {
    on_error: Option<Box<dyn FnOnce(&E) -> ServiceState>>,
}

impl<E: Display> Runner<E> {
    pub fn new() -> Self {
        Self { on_error: None }
    }

    /// Decides the service state a failed check exits with. Without a handler it is
    /// [ServiceState::Unknown].
    pub fn on_error(mut self, f: impl FnOnce(&E) -> ServiceState + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn safe_run(self, f: impl FnOnce() -> Result<Report, E>) -> RunnerResult<E> {
        match f() {
            Ok(report) => RunnerResult::Ok(report),
            Err(err) => {
                let state = self
                    .on_error
                    .map(|f| f(&err))
                    .unwrap_or(ServiceState::Unknown);

                RunnerResult::Err(state, err)
            }
        }
    }
}

impl<E: Display> Default for Runner<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner<CheckError> {
    /// A runner mapping every [CheckError] to the state it reports through [CheckError::state].
    pub fn for_checks() -> Self {
        Runner::new().on_error(CheckError::state)
    }
}

pub enum RunnerResult<E> {
    Ok(Report),
    Err(ServiceState, E),
}

impl<E: Display> RunnerResult<E> {
    pub fn state(&self) -> ServiceState {
        match self {
            RunnerResult::Ok(report) => report.state(),
            RunnerResult::Err(state, _) => *state,
        }
    }

    /// The plugin output: the report, or a single line with the state keyword and the error.
    pub fn to_nagios_string(&self) -> String {
        match self {
            RunnerResult::Ok(report) => report.to_nagios_string(),
            RunnerResult::Err(state, err) => {
                format!("{}: {}", state, sanitize(&err.to_string()))
            }
        }
    }

    pub fn print_and_exit(self) -> ! {
        println!("{}", self.to_nagios_string());
        std::process::exit(self.state().exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("woops")]
    struct EmptyError;

    #[test]
    fn test_runner_ok() {
        let result = Runner::<EmptyError>::new()
            .on_error(|_| panic!("no error expected"))
            .safe_run(|| Ok(Report::new(ServiceState::Ok, Some("fine"))));

        assert!(matches!(result, RunnerResult::Ok(_)));
        assert_eq!(result.to_nagios_string(), "OK: fine");
    }

    #[test]
    fn test_runner_error_defaults_to_unknown() {
        let result = Runner::<EmptyError>::new().safe_run(|| Err(EmptyError {}));

        assert!(matches!(result, RunnerResult::Err(ServiceState::Unknown, _)));
        assert_eq!(result.state().exit_code(), 3);
        assert_eq!(result.to_nagios_string(), "UNKNOWN: woops");
    }

    #[test]
    fn test_runner_error_handler() {
        let result = Runner::<EmptyError>::new()
            .on_error(|_| ServiceState::Critical)
            .safe_run(|| Err(EmptyError {}));

        assert_eq!(result.state(), ServiceState::Critical);
        assert_eq!(result.to_nagios_string(), "CRITICAL: woops");
    }

    #[test]
    fn test_runner_for_checks() {
        let result = Runner::for_checks()
            .safe_run(|| Err(CheckError::Transport("connection refused".to_owned())));

        assert_eq!(result.state(), ServiceState::Unknown);
        assert_eq!(result.to_nagios_string(), "UNKNOWN: connection refused");
    }

    #[test]
    fn test_runner_error_is_single_line() {
        use crate::client::fake::FakeTransport;
        use crate::client::{ApiClient, Method};

        let transport = FakeTransport::new().on(
            Method::Get,
            "/api/v1/jobs/states",
            500,
            "<html>\n<body>Internal | Error</body>\n</html>",
        );
        let client = ApiClient::new(transport, "https://veeam:9419");

        let result = Runner::for_checks().safe_run(|| {
            client.get_text("/api/v1/jobs/states")?;
            Ok(Report::new(ServiceState::Ok, None))
        });

        assert_eq!(result.state(), ServiceState::Unknown);
        assert_eq!(
            result.to_nagios_string(),
            "UNKNOWN: GET /api/v1/jobs/states returned HTTP 500: <html> <body>Internal / Error</body> </html>"
        );
    }
}
