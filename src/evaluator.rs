//! The status evaluator: turns a batch of [Observation]s into one aggregated [ServiceState]
//! plus an ordered list of findings.
//!
//! Evaluation runs in three stages:
//!
//! 1. *Filtering* (backups and jobs only): the label has to match the [NameFilter] and the
//!    timestamp has to be at most `max_age_hours` old. Everything else is dropped silently.
//! 2. *Classification*: each retained observation lands in the critical, warning or ok
//!    [Bucket] according to the rule for its [ObservationKind].
//! 3. *Aggregation*: any critical entry makes the result CRITICAL, otherwise any warning entry
//!    makes it WARNING, otherwise it is OK.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::observation::{AlarmSeverity, Observation, ObservationKind, Outcome};
use crate::report::sanitize;
use crate::{CheckError, ServiceState};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FilterMode {
    /// Case-insensitive containment.
    #[default]
    Substring,
    /// Case-insensitive equality.
    Exact,
}

/// Optional name filter matched against an observation's label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameFilter {
    pattern: Option<String>,
    mode: FilterMode,
}

impl NameFilter {
    pub fn new(pattern: Option<&str>, mode: FilterMode) -> Self {
        NameFilter {
            pattern: pattern.map(|p| p.to_lowercase()),
            mode,
        }
    }

    pub fn is_set(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn matches(&self, label: &str) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };

        let label = label.to_lowercase();
        match self.mode {
            FilterMode::Substring => label.contains(pattern.as_str()),
            FilterMode::Exact => &label == pattern,
        }
    }
}

/// Warning and critical thresholds for a value where higher is worse. Both are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Levels {
    pub warning: f64,
    pub critical: f64,
}

impl Levels {
    pub fn try_new(warning: f64, critical: f64) -> Result<Self, CheckError> {
        if warning > critical {
            return Err(CheckError::Configuration(format!(
                "warning threshold {warning} is above critical threshold {critical}"
            )));
        }

        Ok(Levels { warning, critical })
    }

    pub fn classify(&self, value: f64) -> Bucket {
        if value >= self.critical {
            Bucket::Critical
        } else if value >= self.warning {
            Bucket::Warning
        } else {
            Bucket::Ok
        }
    }
}

impl Default for Levels {
    fn default() -> Self {
        Levels {
            warning: 80.0,
            critical: 90.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationConfig {
    pub max_age_hours: u32,
    pub name_filter: NameFilter,
    pub levels: Levels,
    /// No retained observation at all is CRITICAL instead of OK.
    pub empty_means_stale: bool,
    /// Only the newest retained backup/job observation per label is classified.
    pub latest_per_label: bool,
    /// Labels that must have at least one retained backup/job observation.
    pub required_labels: Vec<String>,
    /// Plural noun naming what is evaluated, used in the headline.
    pub subject: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            max_age_hours: 24,
            name_filter: NameFilter::default(),
            levels: Levels::default(),
            empty_means_stale: false,
            latest_per_label: false,
            required_labels: Vec::new(),
            subject: "observations".to_owned(),
        }
    }
}

impl EvaluationConfig {
    fn max_age(&self) -> Duration {
        Duration::hours(i64::from(self.max_age_hours))
    }

    fn is_recent(&self, observation: &Observation, now: DateTime<Utc>) -> bool {
        observation
            .timestamp
            .map(|timestamp| now - timestamp <= self.max_age())
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Critical,
    Warning,
    Ok,
}

impl Bucket {
    pub fn state(&self) -> ServiceState {
        match self {
            Bucket::Critical => ServiceState::Critical,
            Bucket::Warning => ServiceState::Warning,
            Bucket::Ok => ServiceState::Ok,
        }
    }
}

/// Classifies a single observation by the rule of its kind.
pub fn classify(observation: &Observation, levels: &Levels) -> Bucket {
    match observation.kind {
        ObservationKind::Alarm => match (observation.outcome, observation.severity) {
            (Outcome::Open, Some(AlarmSeverity::Critical)) => Bucket::Critical,
            (Outcome::Open, Some(AlarmSeverity::High | AlarmSeverity::Medium)) => Bucket::Warning,
            _ => Bucket::Ok,
        },
        ObservationKind::Backup | ObservationKind::Job => match observation.outcome {
            Outcome::Failed => Bucket::Critical,
            Outcome::Warning => Bucket::Warning,
            _ => Bucket::Ok,
        },
        ObservationKind::Capacity => observation
            .metrics
            .map(|metrics| levels.classify(metrics.used_percent()))
            .unwrap_or(Bucket::Ok),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub critical: usize,
    pub warning: usize,
    pub ok: usize,
}

impl fmt::Display for BucketCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} critical, {} warning, {} ok",
            self.critical, self.warning, self.ok
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    pub severity: ServiceState,
    pub headline: String,
    pub findings: Vec<String>,
    /// Ages of the newest excluded observations behind stale findings. Kept apart from the
    /// findings, which only depend on the retained observations.
    pub notes: Vec<String>,
    pub counts: BucketCounts,
    /// Number of observations dropped by the filter stage.
    pub excluded: usize,
}

impl EvaluationResult {
    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }
}

fn entry(identity: &str, outcome: &str, label: &str, detail: &str) -> String {
    let (identity, label) = (sanitize(identity), sanitize(label));
    if detail.is_empty() {
        format!(" - {identity} [{outcome}] {label}")
    } else {
        format!(" - {identity} [{outcome}] {label}: {}", sanitize(detail))
    }
}

fn age_hours(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> f64 {
    (now - timestamp).num_minutes() as f64 / 60.0
}

/// Evaluates the observations against the current time.
pub fn evaluate(observations: &[Observation], config: &EvaluationConfig) -> EvaluationResult {
    evaluate_at(observations, config, Utc::now())
}

/// Result of the filter stage.
#[derive(Debug)]
pub struct Filtered<'a> {
    /// Observations that are classified.
    pub retained: Vec<&'a Observation>,
    /// Backups and jobs whose label matched but which are too old or carry no timestamp.
    pub stale: Vec<&'a Observation>,
    pub excluded: usize,
}

/// Applies the name filter, the age filter and, if configured, the latest-per-label reduction.
/// Alarms and capacity readings pass unchanged.
pub fn filter_at<'a>(
    observations: &'a [Observation],
    config: &EvaluationConfig,
    now: DateTime<Utc>,
) -> Filtered<'a> {
    let mut retained: Vec<&Observation> = Vec::new();
    let mut stale: Vec<&Observation> = Vec::new();
    let mut excluded = 0;

    for observation in observations {
        if !observation.kind.is_filtered() {
            retained.push(observation);
        } else if !config.name_filter.matches(&observation.label) {
            excluded += 1;
        } else if config.is_recent(observation, now) {
            retained.push(observation);
        } else {
            excluded += 1;
            stale.push(observation);
        }
    }

    if config.latest_per_label {
        retained = latest_per_label(retained);
    }

    Filtered {
        retained,
        stale,
        excluded,
    }
}

/// Evaluates the observations as of `now`.
pub fn evaluate_at(
    observations: &[Observation],
    config: &EvaluationConfig,
    now: DateTime<Utc>,
) -> EvaluationResult {
    let Filtered {
        retained,
        stale,
        excluded,
    } = filter_at(observations, config, now);

    tracing::debug!(
        retained = retained.len(),
        excluded,
        "filtered {}",
        config.subject
    );

    let mut critical = Vec::new();
    let mut warning = Vec::new();
    let mut notes = Vec::new();
    let mut ok = 0;

    for observation in &retained {
        let line = || {
            entry(
                &observation.identity,
                &observation.outcome_display(),
                &observation.label,
                &observation.detail,
            )
        };
        match classify(observation, &config.levels) {
            Bucket::Critical => critical.push(line()),
            Bucket::Warning => warning.push(line()),
            Bucket::Ok => ok += 1,
        }
    }

    for label in &config.required_labels {
        let present = retained
            .iter()
            .any(|o| o.kind.is_filtered() && &o.label == label);
        if present {
            continue;
        }

        let detail = format!("no backup within the last {} hours", config.max_age_hours);
        critical.push(entry(label, "Stale", label, &detail));
        if let Some(timestamp) = newest(stale.iter().copied().filter(|o| &o.label == label)) {
            notes.push(format!(
                "newest {} is {:.1} hours old",
                sanitize(label),
                age_hours(now, timestamp)
            ));
        }
    }

    if config.empty_means_stale && retained.is_empty() {
        let detail = format!("nothing within the last {} hours", config.max_age_hours);
        critical.push(entry("*", "Stale", &config.subject, &detail));
        if let Some(timestamp) = newest(stale.iter().copied()) {
            notes.push(format!(
                "newest of the {} is {:.1} hours old",
                config.subject,
                age_hours(now, timestamp)
            ));
        }
    }

    let counts = BucketCounts {
        critical: critical.len(),
        warning: warning.len(),
        ok,
    };

    let severity = if counts.critical > 0 {
        ServiceState::Critical
    } else if counts.warning > 0 {
        ServiceState::Warning
    } else {
        ServiceState::Ok
    };

    let windowed = config.empty_means_stale
        || !config.required_labels.is_empty()
        || observations.iter().any(|o| o.kind.is_filtered());
    let window = if windowed {
        format!(" within the last {} hours", config.max_age_hours)
    } else {
        String::new()
    };

    let headline = if counts.critical == 0 && counts.warning == 0 {
        if retained.is_empty() {
            format!("no {}{}", config.subject, window)
        } else {
            format!("ok: {} {}{}", counts.ok, config.subject, window)
        }
    } else {
        format!("{} {}{}", counts, config.subject, window)
    };

    let mut findings = Vec::new();
    if !critical.is_empty() {
        findings.push(format!("Critical ({}):", critical.len()));
        findings.extend(critical);
    }
    if !warning.is_empty() {
        findings.push(format!("Warning ({}):", warning.len()));
        findings.extend(warning);
    }
    findings.push(format!("OK: {ok}"));

    EvaluationResult {
        severity,
        headline,
        findings,
        notes,
        counts,
        excluded,
    }
}

fn newest<'a>(observations: impl Iterator<Item = &'a Observation>) -> Option<DateTime<Utc>> {
    observations.filter_map(|o| o.timestamp).max()
}

/// Keeps the newest backup/job observation per label, in order of first appearance.
fn latest_per_label(observations: Vec<&Observation>) -> Vec<&Observation> {
    let mut latest: Vec<&Observation> = Vec::with_capacity(observations.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for observation in observations {
        if !observation.kind.is_filtered() {
            latest.push(observation);
            continue;
        }

        match index.get(observation.label.as_str()) {
            Some(&i) => {
                if observation.timestamp > latest[i].timestamp {
                    latest[i] = observation;
                }
            }
            None => {
                index.insert(observation.label.as_str(), latest.len());
                latest.push(observation);
            }
        }
    }

    latest
}
