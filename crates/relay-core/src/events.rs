//! Run lifecycle events.

use crate::ids::{JobId, PipelineId, RunId, StepId};
use crate::run::{JobStatus, RunStatus, StepStatus};
use crate::trigger::EventKind;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Events published while a pipeline run progresses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted(RunStartedPayload),
    JobStarted(JobStartedPayload),
    StepFinished(StepFinishedPayload),
    JobFinished(JobFinishedPayload),
    RunFinished(RunFinishedPayload),
}

impl RunEvent {
    /// Dotted subject for routing and log correlation.
    pub fn subject(&self) -> String {
        match self {
            RunEvent::RunStarted(p) => format!("run.started.{}.{}", p.pipeline, p.run_id),
            RunEvent::JobStarted(p) => format!("run.{}.job.{}.started", p.run_id, p.job_id),
            RunEvent::StepFinished(p) => {
                format!("run.{}.job.{}.step.{}.finished", p.run_id, p.job_id, p.step_id)
            }
            RunEvent::JobFinished(p) => format!("run.{}.job.{}.finished", p.run_id, p.job_id),
            RunEvent::RunFinished(p) => format!("run.finished.{}.{}", p.pipeline, p.run_id),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            RunEvent::RunStarted(p) => p.run_id,
            RunEvent::JobStarted(p) => p.run_id,
            RunEvent::StepFinished(p) => p.run_id,
            RunEvent::JobFinished(p) => p.run_id,
            RunEvent::RunFinished(p) => p.run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub pipeline: PipelineId,
    pub event_kind: EventKind,
    pub git_ref: String,
    pub job_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub wave: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepFinishedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub step_id: StepId,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobFinishedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunFinishedPayload {
    pub run_id: RunId,
    pub pipeline: PipelineId,
    pub status: RunStatus,
    pub jobs_succeeded: u32,
    pub jobs_failed: u32,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}
