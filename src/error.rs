use crate::credentials::CredentialsError;
use crate::ServiceState;

/// Everything that can keep a check from producing an evaluation.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("credentials: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("{context} failed: {source}")]
    Request {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} returned HTTP {status}: {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Transport(String),
    #[error("could not parse {context}: {message}")]
    Parse { context: String, message: String },
}

impl CheckError {
    pub fn parse(context: &str, message: impl ToString) -> Self {
        CheckError::Parse {
            context: context.to_owned(),
            message: message.to_string(),
        }
    }

    /// The service state a check exits with when it fails with this error.
    ///
    /// Transport failures are reported as UNKNOWN like every other failure that keeps the
    /// evaluation from running: the monitored system's state is not known.
    pub fn state(&self) -> ServiceState {
        match self {
            CheckError::Configuration(_)
            | CheckError::Credentials(_)
            | CheckError::Request { .. }
            | CheckError::Status { .. }
            | CheckError::Transport(_)
            | CheckError::Parse { .. } => ServiceState::Unknown,
        }
    }
}
