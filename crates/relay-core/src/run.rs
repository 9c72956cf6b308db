//! Run and execution types.

use crate::error::Error;
use crate::ids::{JobId, PipelineId, RunId, StepId};
use crate::pipeline::ActionKind;
use crate::trigger::Event;
use crate::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed output value produced by a step or exported by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OutputValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl OutputValue {
    /// Interpret raw `key=value` text emitted by an action.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => OutputValue::Bool(true),
            "false" => OutputValue::Bool(false),
            _ => match trimmed.parse::<i64>() {
                Ok(n) => OutputValue::Integer(n),
                Err(_) => OutputValue::Text(trimmed.to_string()),
            },
        }
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Bool(b) => write!(f, "{b}"),
            OutputValue::Integer(n) => write!(f, "{n}"),
            OutputValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OutputValue {
    fn from(value: bool) -> Self {
        OutputValue::Bool(value)
    }
}

impl From<i64> for OutputValue {
    fn from(value: i64) -> Self {
        OutputValue::Integer(value)
    }
}

impl From<&str> for OutputValue {
    fn from(value: &str) -> Self {
        OutputValue::Text(value.to_string())
    }
}

impl From<String> for OutputValue {
    fn from(value: String) -> Self {
        OutputValue::Text(value)
    }
}

pub type Outputs = BTreeMap<String, OutputValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Skipped,
    Succeeded,
    Failed,
    /// A dependency did not succeed; the job never started.
    Blocked,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Succeeded or skipped: does not fail the run.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Skipped => "skipped",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Blocked => "blocked",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepRecord {
    pub step_id: StepId,
    pub action: ActionKind,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub outputs: Outputs,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    StepFailed,
    StepTimeout,
    PermissionDenied,
    SecretNotFound,
    DependencyFailed,
    Cancelled,
    Internal,
}

/// Error attached to a job result and surfaced in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::StepFailed { .. } => JobErrorKind::StepFailed,
            Error::StepTimeout { .. } => JobErrorKind::StepTimeout,
            Error::PermissionDenied { .. } => JobErrorKind::PermissionDenied,
            Error::SecretNotFound(_) | Error::SecretProviderNotConfigured(_) => {
                JobErrorKind::SecretNotFound
            }
            Error::Cancelled { .. } => JobErrorKind::Cancelled,
            _ => JobErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub outputs: Outputs,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    pub error: Option<JobError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobResult {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            outputs: Outputs::new(),
            steps: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Move to `to`. Terminal statuses are final.
    pub fn transition(&mut self, to: JobStatus) -> Result<()> {
        let allowed = match (self.status, to) {
            (from, _) if from.is_terminal() => false,
            (_, JobStatus::Pending) => false,
            (JobStatus::Running, JobStatus::Running) => false,
            _ => true,
        };
        if !allowed {
            return Err(Error::InvalidTransition {
                job: self.job_id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        if to == JobStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
            self.duration_ms = Some(
                self.started_at
                    .map(|s| (now - s).num_milliseconds().max(0) as u64)
                    .unwrap_or(0),
            );
        }
        self.status = to;
        Ok(())
    }

    /// Move to a terminal status and record the error that caused it.
    pub fn finish_with_error(&mut self, to: JobStatus, error: JobError) -> Result<()> {
        self.transition(to)?;
        self.error = Some(error);
        Ok(())
    }

    pub fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_id.as_str() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a pipeline for one event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline: PipelineId,
    pub event: Event,
    /// Job results in topological order.
    pub results: Vec<JobResult>,
    pub status: RunStatus,
    #[serde(default)]
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl PipelineRun {
    pub fn new(pipeline: PipelineId, event: Event) -> Self {
        Self {
            id: RunId::new(),
            pipeline,
            event,
            results: Vec::new(),
            status: RunStatus::Running,
            cancelled: false,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn result(&self, job: &str) -> Option<&JobResult> {
        self.results.iter().find(|r| r.job_id.as_str() == job)
    }

    pub fn result_mut(&mut self, job: &str) -> Option<&mut JobResult> {
        self.results.iter_mut().find(|r| r.job_id.as_str() == job)
    }

    /// Overall status from the job results.
    pub fn derive_status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.results.iter().all(|r| r.status.is_success()) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.status = self.derive_status();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::EventKind;

    fn event() -> Event {
        Event::new(EventKind::PushAnyBranch, "refs/heads/dev", "acme/widget", "octo")
    }

    #[test]
    fn test_output_value_parse() {
        assert_eq!(OutputValue::parse("true"), OutputValue::Bool(true));
        assert_eq!(OutputValue::parse(" false\n"), OutputValue::Bool(false));
        assert_eq!(OutputValue::parse("42"), OutputValue::Integer(42));
        assert_eq!(OutputValue::parse("v1.2.0"), OutputValue::Text("v1.2.0".into()));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut result = JobResult::new(JobId::new("lint"));
        result.transition(JobStatus::Running).unwrap();
        result.transition(JobStatus::Succeeded).unwrap();
        assert!(result.duration_ms.is_some());

        let err = result.transition(JobStatus::Failed).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(result.status, JobStatus::Succeeded);
    }

    #[test]
    fn test_pending_can_end_without_running() {
        let mut result = JobResult::new(JobId::new("publish"));
        result.transition(JobStatus::Blocked).unwrap();
        assert_eq!(result.duration_ms, Some(0));
        assert!(result.transition(JobStatus::Running).is_err());
    }

    #[test]
    fn test_run_status_derivation() {
        let mut run = PipelineRun::new(PipelineId::new("ci"), event());
        let mut ok = JobResult::new(JobId::new("lint"));
        ok.transition(JobStatus::Succeeded).unwrap();
        let mut skipped = JobResult::new(JobId::new("publish"));
        skipped.transition(JobStatus::Skipped).unwrap();
        run.results = vec![ok, skipped];
        assert_eq!(run.derive_status(), RunStatus::Succeeded);

        let mut blocked = JobResult::new(JobId::new("deploy"));
        blocked.transition(JobStatus::Blocked).unwrap();
        run.results.push(blocked);
        assert_eq!(run.derive_status(), RunStatus::Failed);

        run.cancelled = true;
        run.finish();
        assert_eq!(run.status, RunStatus::Cancelled);
    }
}
