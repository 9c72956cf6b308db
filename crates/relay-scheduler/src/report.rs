//! Run reports.
//!
//! A [`RunReport`] summarizes every pipeline run dispatched for one event:
//! per-job status, duration, exported outputs and error, plus the overall
//! status. Reports are logged, rendered as a console table and written as
//! JSON.

use relay_core::ids::{JobId, PipelineId, RunId};
use relay_core::run::{JobError, JobStatus, Outputs, PipelineRun, RunStatus};
use relay_core::trigger::EventKind;
use relay_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobId,
    pub status: JobStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline: PipelineId,
    pub run_id: RunId,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub jobs: Vec<JobReport>,
}

impl From<&PipelineRun> for PipelineReport {
    fn from(run: &PipelineRun) -> Self {
        Self {
            pipeline: run.pipeline.clone(),
            run_id: run.id,
            status: run.status,
            duration_ms: run.duration_ms.unwrap_or(0),
            jobs: run
                .results
                .iter()
                .map(|r| JobReport {
                    job: r.job_id.clone(),
                    status: r.status,
                    duration_ms: r.duration_ms.unwrap_or(0),
                    outputs: r.outputs.clone(),
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub event_kind: EventKind,
    pub git_ref: String,
    pub repository: String,
    pub status: RunStatus,
    pub pipelines: Vec<PipelineReport>,
}

impl RunReport {
    pub fn new(
        event_kind: EventKind,
        git_ref: impl Into<String>,
        repository: impl Into<String>,
        runs: &[PipelineRun],
    ) -> Self {
        let pipelines: Vec<PipelineReport> = runs.iter().map(PipelineReport::from).collect();
        Self {
            event_kind,
            git_ref: git_ref.into(),
            repository: repository.into(),
            status: overall_status(pipelines.iter().map(|p| p.status)),
            pipelines,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| {
            Error::Internal(format!("Failed to write report {}: {}", path.display(), e))
        })
    }

    /// Log one line per pipeline and per failed job.
    pub fn log(&self) {
        for pipeline in &self.pipelines {
            info!(
                pipeline = %pipeline.pipeline,
                run_id = %pipeline.run_id,
                status = %pipeline.status,
                duration_ms = pipeline.duration_ms,
                "Pipeline report"
            );
            for job in &pipeline.jobs {
                if let Some(error) = &job.error {
                    warn!(
                        pipeline = %pipeline.pipeline,
                        job = %job.job,
                        status = %job.status,
                        error = %error.message,
                        "Job did not succeed"
                    );
                }
            }
        }
        info!(status = %self.status, pipelines = self.pipelines.len(), "Run report");
    }

    /// Plain-text table of every job.
    pub fn render_table(&self) -> String {
        let width = self
            .pipelines
            .iter()
            .flat_map(|p| p.jobs.iter().map(|j| j.job.as_str().len()))
            .max()
            .unwrap_or(3)
            .max(3);

        let mut out = String::new();
        for pipeline in &self.pipelines {
            let _ = writeln!(
                out,
                "{} [{}] {:.2}s",
                pipeline.pipeline,
                pipeline.status,
                pipeline.duration_ms as f64 / 1000.0
            );
            let _ = writeln!(out, "  {:<width$}  {:<10}  {:>9}  DETAIL", "JOB", "STATUS", "TIME");
            for job in &pipeline.jobs {
                let detail = match &job.error {
                    Some(error) => error.message.clone(),
                    None => job
                        .outputs
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(" "),
                };
                let _ = writeln!(
                    out,
                    "  {:<width$}  {:<10}  {:>8.2}s  {}",
                    job.job.as_str(),
                    job.status.as_str(),
                    job.duration_ms as f64 / 1000.0,
                    detail
                );
            }
        }
        let _ = writeln!(out, "overall: {}", self.status);
        out
    }
}

/// `cancelled` if any run was cancelled, else `failed` if any failed,
/// else `succeeded`. No runs at all is a success.
pub fn overall_status(statuses: impl IntoIterator<Item = RunStatus>) -> RunStatus {
    let mut overall = RunStatus::Succeeded;
    for status in statuses {
        match status {
            RunStatus::Cancelled => return RunStatus::Cancelled,
            RunStatus::Failed | RunStatus::Running => overall = RunStatus::Failed,
            RunStatus::Succeeded => {}
        }
    }
    overall
}
