use std::fmt;
use std::process;

use crate::evaluator::EvaluationResult;
use crate::ServiceState;

/// A Report is the full plugin output of one check run: a status line with optional performance
/// data, followed by the finding lines.
///
/// ```rust
/// # use infracheck::{PerfData, Report, ServiceState, Unit};
/// let mut report = Report::new(ServiceState::Warning, Some("repository almost full"));
/// report.push_perf_data(PerfData::new("Main Repo", 85.0).with_unit(Unit::Percentage));
/// report.push_line(" - Main Repo: 85% used");
/// assert_eq!(
///     &report.to_nagios_string(),
///     "WARNING: repository almost full | 'Main Repo'=85%\n - Main Repo: 85% used"
/// );
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    name: Option<String>,
    state: ServiceState,
    description: Option<String>,
    lines: Vec<String>,
    perf_data: Vec<PerfData>,
}

impl Report {
    pub fn new(state: ServiceState, description: Option<&str>) -> Report {
        Report {
            name: None,
            state,
            description: description.map(|d| d.to_owned()),
            lines: Vec::new(),
            perf_data: Vec::new(),
        }
    }

    /// Builds a report carrying the severity, headline and findings of an evaluation. The
    /// evaluation's notes follow the findings.
    pub fn from_evaluation(result: EvaluationResult) -> Report {
        let mut lines = result.findings;
        lines.extend(result.notes);

        Report {
            name: None,
            state: result.severity,
            description: Some(result.headline),
            lines,
            perf_data: Vec::new(),
        }
    }

    /// Set the name of this report. It is printed in front of the state.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_owned())
    }

    pub fn set_state(&mut self, state: ServiceState) {
        self.state = state
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = Some(description.to_owned());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn push_perf_data(&mut self, perf_data: PerfData) {
        self.perf_data.push(perf_data)
    }

    pub fn perf_data(&self) -> &[PerfData] {
        &self.perf_data
    }

    /// Returns the multi-line string nagios understands: the first line starts with the state
    /// keyword, the finding lines follow.
    pub fn to_nagios_string(&self) -> String {
        let mut s = String::new();

        if let Some(ref name) = self.name {
            s.push_str(&format!("{} ", name))
        }

        s.push_str(&self.state.to_string());

        if let Some(ref description) = self.description {
            s.push_str(&format!(": {}", sanitize(description)));
        }

        if !self.perf_data.is_empty() {
            s.push_str(" |");

            for perf_data in &self.perf_data {
                s.push_str(&format!(" {}", perf_data));
            }
        }

        for line in &self.lines {
            s.push('\n');
            s.push_str(&sanitize(line));
        }

        s
    }

    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    /// Will print Self::to_nagios_string and exit with the exit code from Self::exit_code
    pub fn print_and_exit(&self) -> ! {
        println!("{}", self.to_nagios_string());
        process::exit(self.exit_code());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    None,
    Percentage,
    Bytes,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::None => "",
            Unit::Percentage => "%",
            Unit::Bytes => "B",
        };
        f.write_str(s)
    }
}

/// One performance data item: `'label'=value[unit];[warn];[crit];[min];[max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PerfData {
    label: String,
    value: f64,
    unit: Unit,
    warning: Option<f64>,
    critical: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl PerfData {
    pub fn new(label: &str, value: f64) -> Self {
        PerfData {
            label: label.to_owned(),
            value,
            unit: Unit::None,
            warning: None,
            critical: None,
            min: None,
            max: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_levels(mut self, warning: f64, critical: f64) -> Self {
        self.warning = Some(warning);
        self.critical = Some(critical);
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn quoted_label(&self) -> String {
        let label = sanitize(&self.label).replace('=', "_").replace('\'', "''");

        if label.contains(' ') {
            format!("'{}'", label)
        } else {
            label
        }
    }
}

/// Makes free text safe for plugin output: `|` would start the performance data and a line
/// break would start a new output line.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_break = false;

    for c in text.chars() {
        match c {
            '\r' | '\n' => {
                if !in_break {
                    out.push(' ');
                }
                in_break = true;
                continue;
            }
            '|' => out.push('/'),
            c => out.push(c),
        }
        in_break = false;
    }

    out
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => ((v * 100.0).round() / 100.0).to_string(),
        None => String::new(),
    }
}

impl fmt::Display for PerfData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = format!(
            "{}={}{}",
            self.quoted_label(),
            format_value(Some(self.value)),
            self.unit
        );
        for threshold in [self.warning, self.critical, self.min, self.max] {
            s.push(';');
            s.push_str(&format_value(threshold));
        }
        f.write_str(s.trim_end_matches(';'))
    }
}
