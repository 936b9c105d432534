//! Generates Icinga2 `CheckCommand` objects from a check's clap command, so the command
//! definitions never drift from the actual arguments.

use clap::ArgAction;

pub struct CommandDescription {
    arguments: Vec<ArgumentDescription>,
}

pub struct ArgumentDescription {
    /// `--long` name for options, the argument id for positionals.
    name: String,
    value: String,
    description: Option<String>,
    is_flag: bool,
    /// Position of a positional argument; positionals are passed without a key.
    position: Option<usize>,
    default_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ToIcingaCommandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid executable path")]
    InvalidExecutablePath,
    #[error("error converting to command description: {0}")]
    CommandDescriptionFromError(#[from] CommandDescriptionFromError),
}

impl CommandDescription {
    pub fn to_icinga_command(&self, name: &str) -> Result<String, ToIcingaCommandError> {
        let current_exe = std::env::current_exe()?
            .to_str()
            .ok_or(ToIcingaCommandError::InvalidExecutablePath)?
            .to_owned();

        Ok(self.render(name, &current_exe))
    }

    fn render(&self, name: &str, executable: &str) -> String {
        let mut out = format!("object CheckCommand \"{name}\" {{\n");
        out.push_str(&format!("  command = [ \"{}\" ]\n", escape_string(executable)));
        out.push_str("  arguments = {\n");

        for arg in &self.arguments {
            let key = match arg.position {
                Some(_) => arg.name.clone(),
                None => format!("--{}", arg.name),
            };
            out.push_str(&format!("    \"{key}\" = {{\n"));

            if arg.is_flag {
                out.push_str(&format!("      set_if = \"${}$\"\n", arg.value));
            } else {
                out.push_str(&format!("      value = \"${}$\"\n", arg.value));
            }

            if let Some(position) = arg.position {
                out.push_str("      skip_key = true\n");
                out.push_str(&format!("      order = {}\n", position));
            }

            if let Some(description) = &arg.description {
                out.push_str(&format!(
                    "      description = \"{}\"\n",
                    escape_string(description)
                ));
            }

            out.push_str("    }\n");
        }
        out.push_str("  }\n");

        let defaults: Vec<_> = self
            .arguments
            .iter()
            .filter_map(|arg| arg.default_value.as_ref().map(|d| (&arg.value, d)))
            .collect();
        if !defaults.is_empty() {
            out.push('\n');
        }
        for (value, default_value) in defaults {
            out.push_str(&format!(
                "  vars.{} = \"{}\"\n",
                value,
                escape_string(default_value)
            ));
        }

        out.push_str("}\n");
        out
    }
}

/// Escapes a string for an Icinga2 double quoted literal. `$` starts a runtime macro there and
/// is written `$$`.
fn escape_string(s: &str) -> String {
    ["\\", "\""]
        .iter()
        .fold(s.to_string(), |acc, c| acc.replace(c, &format!("\\{}", c)))
        .replace('$', "$$")
}

#[derive(Debug, thiserror::Error)]
pub enum CommandDescriptionFromError {
    #[error("argument '{0}' has neither a long name nor a position")]
    UnaddressableArgument(String),
}

impl TryFrom<&clap::Command> for CommandDescription {
    type Error = CommandDescriptionFromError;

    fn try_from(cmd: &clap::Command) -> Result<Self, Self::Error> {
        let mut arguments = Vec::new();
        let mut position = 0;

        for arg in cmd.get_arguments() {
            if matches!(
                arg.get_action(),
                ArgAction::Help
                    | ArgAction::HelpShort
                    | ArgAction::HelpLong
                    | ArgAction::Version
                    | ArgAction::Count
            ) {
                continue;
            }

            let id = arg.get_id().as_str().to_owned();
            let (name, arg_position) = if arg.is_positional() {
                position += 1;
                (id.clone(), Some(position))
            } else {
                let long = arg
                    .get_long()
                    .ok_or_else(|| CommandDescriptionFromError::UnaddressableArgument(id.clone()))?;
                (long.to_owned(), None)
            };

            let value = id.replace('-', "_");
            let description = arg.get_help().map(|s| s.to_string());
            let is_flag = matches!(arg.get_action(), ArgAction::SetTrue);

            let default_value = arg
                .get_default_values()
                .first()
                .and_then(|v| v.to_str())
                .filter(|_| !is_flag)
                .map(|s| s.to_string());

            arguments.push(ArgumentDescription {
                name,
                value,
                description,
                is_flag,
                position: arg_position,
                default_value,
            });
        }

        Ok(CommandDescription { arguments })
    }
}

/// Print the Icinga command configuration if the GENERATE_ICINGA_COMMAND environment variable is set
/// and exit the process.
pub fn print_icinga_command_config_if_env_and_exit(
    name: &str,
    cmd: &clap::Command,
) -> Result<(), ToIcingaCommandError> {
    if std::env::var_os("GENERATE_ICINGA_COMMAND").is_none() {
        return Ok(());
    }

    let description = CommandDescription::try_from(cmd)?;
    let out = description.to_icinga_command(name)?;

    println!("{}", out.trim());
    std::process::exit(0);
}
