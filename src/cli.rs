//! Command line front-end shared by all check binaries.

use std::fmt::Debug;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};
use tracing_subscriber::EnvFilter;

use crate::client::{ApiClient, HttpTransport, Transport};
use crate::config_generator;
use crate::credentials::Credentials;
use crate::evaluator::{EvaluationConfig, FilterMode, Levels, NameFilter};
use crate::{CheckError, Report, Runner, ServiceState};

/// Arguments every check accepts. Options a check has no use for are accepted and ignored.
#[derive(Debug, Clone, clap::Args)]
pub struct CommonArgs {
    /// File with the username (optionally DOMAIN\user) on the first line and the password on the second
    pub credentials_file: PathBuf,
    /// Base URL of the REST API, e.g. https://nsx.example.com or https://veeam:9419
    pub api_base_url: String,
    /// Maximum age in hours for a backup or job run to count as recent
    #[arg(long, default_value_t = 24)]
    pub max_age_hours: u32,
    /// Only evaluate items whose name matches
    #[arg(long)]
    pub name_filter: Option<String>,
    /// How --name-filter is matched
    #[arg(long, value_enum, default_value_t = FilterMode::Substring)]
    pub filter_mode: FilterMode,
    /// Used space percentage at which capacity checks turn WARNING
    #[arg(long, default_value_t = 80.0)]
    pub warning_pct: f64,
    /// Used space percentage at which capacity checks turn CRITICAL
    #[arg(long, default_value_t = 90.0)]
    pub critical_pct: f64,
    /// Verify the appliance's TLS certificate
    #[arg(long, env = "INFRACHECK_VERIFY_TLS")]
    pub verify_tls: bool,
    /// Value of the x-api-version header sent to the backup server REST API
    #[arg(long, env = "INFRACHECK_API_VERSION", default_value = "1.2-rev0")]
    pub api_version: String,
    /// Log to stderr, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CommonArgs {
    /// Builds the evaluation configuration from the shared options.
    pub fn evaluation_config(&self, subject: &str) -> Result<EvaluationConfig, CheckError> {
        Ok(EvaluationConfig {
            max_age_hours: self.max_age_hours,
            name_filter: self.name_filter(),
            levels: Levels::try_new(self.warning_pct, self.critical_pct)?,
            subject: subject.to_owned(),
            ..EvaluationConfig::default()
        })
    }

    pub fn name_filter(&self) -> NameFilter {
        NameFilter::new(self.name_filter.as_deref(), self.filter_mode)
    }
}

#[derive(Debug, Parser)]
pub struct Cli<A: clap::Args> {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub check: A,
}

/// Check specific options for checks that have none.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct NoArgs {}

/// A single monitoring check.
pub trait Check {
    /// Binary and Icinga command name.
    const NAME: &'static str;
    const ABOUT: &'static str;

    type Args: clap::Args + Debug;

    fn run<T: Transport>(
        common: &CommonArgs,
        args: &Self::Args,
        credentials: &Credentials,
        client: &mut ApiClient<T>,
    ) -> Result<Report, CheckError>;
}

/// Reads the credentials, builds the client and runs the check.
pub fn execute<C: Check, T: Transport>(
    cli: &Cli<C::Args>,
    transport: T,
) -> Result<Report, CheckError> {
    let credentials = Credentials::from_file(&cli.common.credentials_file)?;
    tracing::debug!(username = credentials.username(), "loaded credentials");

    let mut client = ApiClient::new(transport, &cli.common.api_base_url);
    C::run(&cli.common, &cli.check, &credentials, &mut client)
}

/// Entry point of every check binary: parses the command line, runs the check, prints the
/// result and exits with the nagios exit code.
pub fn run_check<C: Check>() -> ! {
    let cli = parse_args::<C>();
    init_logging(cli.common.verbose);
    tracing::debug!(check = C::NAME, ?cli, "starting");

    Runner::for_checks()
        .safe_run(|| {
            let transport = HttpTransport::new(cli.common.verify_tls)?;
            execute::<C, _>(&cli, transport)
        })
        .print_and_exit()
}

fn exit_unknown(message: &str) -> ! {
    println!("{}: {}", ServiceState::Unknown, message);
    std::process::exit(ServiceState::Unknown.exit_code());
}

/// Argument errors exit UNKNOWN instead of clap's default exit code 2, which nagios would read
/// as CRITICAL.
fn parse_args<C: Check>() -> Cli<C::Args> {
    let command = Cli::<C::Args>::command().name(C::NAME).about(C::ABOUT);

    if let Err(e) = config_generator::print_icinga_command_config_if_env_and_exit(C::NAME, &command)
    {
        exit_unknown(&e.to_string());
    }

    let matches = match command.try_get_matches() {
        Ok(matches) => matches,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let rendered = e.render().to_string();
            let message = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ");
            exit_unknown(message)
        }
    };

    Cli::<C::Args>::from_arg_matches(&matches).unwrap_or_else(|e| exit_unknown(&e.to_string()))
}

/// Logs go to stderr, stdout belongs to the plugin output. `RUST_LOG` applies unless `-v` is
/// given.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
