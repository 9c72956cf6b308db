//! Pipeline execution.
//!
//! The executor walks a pipeline's job graph wave by wave. Jobs of one wave
//! run concurrently as tokio tasks and the next wave starts only once every
//! job of the current wave is terminal. Each job goes through the same
//! sequence:
//!
//! 1. dependency gate: a failed, blocked or cancelled dependency blocks the
//!    job; a skipped dependency skips it unless its condition tests that
//!    dependency's status
//! 2. job condition: false skips the job without invoking any step
//! 3. credential issue: a permission outside the granted scope fails the job
//!    before any step runs
//! 4. steps, in order; the first failing step fails the job
//!
//! Errors never escape [`PipelineExecutor::execute`]: they are attached to
//! the affected [`JobResult`] and reflected in the run status.

use crate::cancel::CancelToken;
use crate::catalog::LoadedPipeline;
use crate::sinks::TracingEventSink;
use chrono::Utc;
use relay_cache::CacheStore;
use relay_core::condition::ConditionContext;
use relay_core::error::Error;
use relay_core::events::{
    JobFinishedPayload, JobStartedPayload, RunEvent, RunFinishedPayload, RunStartedPayload,
    StepFinishedPayload,
};
use relay_core::ids::{JobId, RunId};
use relay_core::pipeline::{JobDefinition, StepDefinition};
use relay_core::ports::EventSink;
use relay_core::run::{
    JobError, JobErrorKind, JobResult, JobStatus, OutputValue, Outputs, PipelineRun, StepRecord,
    StepStatus,
};
use relay_core::secrets::GrantedScope;
use relay_core::trigger::Event;
use relay_runner::{ActionRegistry, OutputLine, OutputStream, StepContext, StepResult, StepRunner};
use relay_secrets::{CredentialBroker, JobCredentials};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a job's steps run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// A fresh `<workspace>/<run id>/<job id>` per job, removed when the run
    /// finishes.
    #[default]
    Isolated,
    /// Directly in `workspace`. Concurrent runs see each other's files.
    InPlace,
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Workspace root.
    pub workspace: PathBuf,
    pub workspace_mode: WorkspaceMode,
    /// Toolchain name handed to steps and mixed into cache keys.
    pub toolchain: String,
    /// Upper bound on concurrently running jobs; `None` runs a whole wave at once.
    pub max_parallel_jobs: Option<usize>,
    /// Extra environment for every step.
    pub variables: HashMap<String, String>,
}

impl ExecutorConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            workspace_mode: WorkspaceMode::default(),
            toolchain: "stable".to_string(),
            max_parallel_jobs: None,
            variables: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Directory holding every job workspace of a run, when isolated.
    pub fn run_workspace(&self, run_id: RunId) -> Option<PathBuf> {
        match self.workspace_mode {
            WorkspaceMode::Isolated => Some(self.workspace.join(run_id.to_string())),
            WorkspaceMode::InPlace => None,
        }
    }

    /// Directory a job's steps run in.
    pub fn job_workspace(&self, run_id: RunId, job_id: &JobId) -> PathBuf {
        match self.run_workspace(run_id) {
            Some(run_dir) => run_dir.join(job_id.as_str()),
            None => self.workspace.clone(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

struct ExecutorInner {
    registry: ActionRegistry,
    broker: CredentialBroker,
    cache: Option<Arc<dyn CacheStore>>,
    sink: Arc<dyn EventSink>,
    config: ExecutorConfig,
}

/// Runs pipelines. Cheap to clone; clones share actions, broker, cache and sink.
#[derive(Clone)]
pub struct PipelineExecutor {
    inner: Arc<ExecutorInner>,
}

impl PipelineExecutor {
    pub fn new(registry: ActionRegistry, broker: CredentialBroker, config: ExecutorConfig) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                broker,
                cache: None,
                sink: Arc::new(TracingEventSink::new()),
                config,
            }),
        }
    }

    /// Builder: set the cache store handed to cache steps.
    ///
    /// Must be called before the executor is cloned.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.cache = Some(cache);
        }
        self
    }

    /// Builder: set the lifecycle event sink.
    ///
    /// Must be called before the executor is cloned.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.sink = sink;
        }
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Execute one pipeline for one event.
    pub async fn execute(
        &self,
        pipeline: &LoadedPipeline,
        event: &Event,
        scope: &GrantedScope,
        cancel: CancelToken,
    ) -> PipelineRun {
        let definition = &pipeline.definition;
        let mut run = PipelineRun::new(definition.name.clone(), event.clone());
        run.results = pipeline
            .graph
            .topological_order()
            .into_iter()
            .map(JobResult::new)
            .collect();

        info!(
            run_id = %run.id,
            pipeline = %definition.name,
            event_kind = %event.kind,
            git_ref = %event.git_ref,
            jobs = run.results.len(),
            waves = pipeline.graph.waves().len(),
            "Starting pipeline run"
        );
        self.emit(RunEvent::RunStarted(RunStartedPayload {
            run_id: run.id,
            pipeline: definition.name.clone(),
            event_kind: event.kind,
            git_ref: event.git_ref.clone(),
            job_count: run.results.len() as u32,
            started_at: run.started_at,
        }))
        .await;

        let semaphore = self
            .inner
            .config
            .max_parallel_jobs
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        for (wave_index, wave) in pipeline.graph.waves().iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let mut join_set = JoinSet::new();

            for job_id in wave {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(job) = definition.job(job_id.as_str()) else {
                    continue;
                };

                let upstream = Upstream::capture(&run, job);
                match gate(job, &upstream) {
                    Gate::Blocked(dependency) => {
                        let error = JobError::new(
                            JobErrorKind::DependencyFailed,
                            format!("dependency '{}' did not succeed", dependency),
                        );
                        self.settle(&mut run, job_id, JobStatus::Blocked, Some(error))
                            .await;
                        continue;
                    }
                    Gate::Skipped(reason) => {
                        debug!(job = %job_id, reason = %reason, "Job skipped");
                        self.settle(&mut run, job_id, JobStatus::Skipped, None).await;
                        continue;
                    }
                    Gate::Run => {}
                }

                if let Some(result) = run.result_mut(job_id.as_str())
                    && let Err(e) = result.transition(JobStatus::Running)
                {
                    warn!(job = %job_id, error = %e, "Job could not start");
                    continue;
                }
                self.emit(RunEvent::JobStarted(JobStartedPayload {
                    run_id: run.id,
                    job_id: job_id.clone(),
                    wave: wave_index as u32,
                    started_at: Utc::now(),
                }))
                .await;

                let executor = self.clone();
                let job = job.clone();
                let scope = scope.clone();
                let event = event.clone();
                let cancel = cancel.clone();
                let semaphore = semaphore.clone();
                let run_id = run.id;
                join_set.spawn(async move {
                    let _permit = match semaphore {
                        Some(s) => s.acquire_owned().await.ok(),
                        None => None,
                    };
                    let outcome = executor
                        .run_job(run_id, &job, &upstream, &event, &scope, &cancel)
                        .await;
                    (job.id, outcome)
                });
            }

            // Join barrier: the next wave starts once every job here is terminal.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((job_id, outcome)) => {
                        if let Some(result) = run.result_mut(job_id.as_str()) {
                            result.steps = outcome.steps;
                            result.outputs = outcome.outputs;
                        }
                        self.settle(&mut run, &job_id, outcome.status, outcome.error)
                            .await;
                    }
                    Err(e) => error!(run_id = %run.id, error = %e, "Job task failed"),
                }
            }

            // A task that panicked leaves its job running.
            for job_id in wave {
                if run
                    .result(job_id.as_str())
                    .is_some_and(|r| r.status == JobStatus::Running)
                {
                    let error = JobError::new(JobErrorKind::Internal, "job task aborted");
                    self.settle(&mut run, job_id, JobStatus::Failed, Some(error))
                        .await;
                }
            }
        }

        if cancel.is_cancelled() {
            let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            let pending: Vec<JobId> = run
                .results
                .iter()
                .filter(|r| !r.status.is_terminal())
                .map(|r| r.job_id.clone())
                .collect();
            for job_id in pending {
                let error = JobError::new(JobErrorKind::Cancelled, reason.clone());
                self.settle(&mut run, &job_id, JobStatus::Cancelled, Some(error))
                    .await;
            }
        }
        if let Some(run_dir) = self.inner.config.run_workspace(run.id)
            && let Err(e) = tokio::fs::remove_dir_all(&run_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %run_dir.display(), error = %e, "Failed to clean up run workspace");
        }

        run.cancelled = run
            .results
            .iter()
            .any(|r| r.status == JobStatus::Cancelled);
        run.finish();

        let jobs_succeeded = run
            .results
            .iter()
            .filter(|r| r.status == JobStatus::Succeeded)
            .count() as u32;
        let jobs_failed = run
            .results
            .iter()
            .filter(|r| matches!(r.status, JobStatus::Failed | JobStatus::Blocked))
            .count() as u32;
        let duration_ms = run.duration_ms.unwrap_or(0);

        info!(
            run_id = %run.id,
            pipeline = %run.pipeline,
            status = %run.status,
            succeeded = jobs_succeeded,
            failed = jobs_failed,
            duration_ms,
            "Pipeline run finished"
        );
        self.emit(RunEvent::RunFinished(RunFinishedPayload {
            run_id: run.id,
            pipeline: run.pipeline.clone(),
            status: run.status,
            jobs_succeeded,
            jobs_failed,
            duration_ms,
            completed_at: run.completed_at.unwrap_or_else(Utc::now),
        }))
        .await;

        run
    }

    /// Run the credential check and steps of one job.
    async fn run_job(
        &self,
        run_id: RunId,
        job: &JobDefinition,
        upstream: &Upstream,
        event: &Event,
        scope: &GrantedScope,
        cancel: &CancelToken,
    ) -> JobOutcome {
        let credentials = match self.inner.broker.issue(job, scope).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(job = %job.id, error = %e, "Credentials not issued");
                return JobOutcome::failed(JobError::from(&e));
            }
        };

        let workspace = self.inner.config.job_workspace(run_id, &job.id);
        if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
            error!(
                job = %job.id,
                path = %workspace.display(),
                error = %e,
                "Failed to create job workspace"
            );
            let err = Error::Internal(format!("Failed to create workspace: {}", e));
            return JobOutcome::failed(JobError::from(&err));
        }
        debug!(job = %job.id, path = %workspace.display(), "Job workspace ready");

        let deadline = job
            .timeout_minutes
            .map(|m| (m, Instant::now() + minutes(m)));
        let mut outcome = JobOutcome::running();
        let mut step_outputs: HashMap<String, Outputs> = HashMap::new();

        for step in &job.steps {
            if cancel.is_cancelled() {
                outcome.finish(JobStatus::Cancelled, Some(cancelled_error(cancel)));
                return outcome;
            }

            if let Some(condition) = &step.condition {
                let view = StepView {
                    upstream,
                    steps: &step_outputs,
                };
                if !condition.evaluate(&view) {
                    debug!(job = %job.id, step = %step.id, "Step skipped");
                    let record = StepRecord {
                        step_id: step.id.clone(),
                        action: step.uses,
                        status: StepStatus::Skipped,
                        exit_code: None,
                        outputs: Outputs::new(),
                        duration_ms: 0,
                        error: None,
                    };
                    self.step_finished(run_id, &job.id, &record).await;
                    outcome.steps.push(record);
                    continue;
                }
            }

            let prepared = credentials.for_step(step).and_then(|secrets| {
                self.inner
                    .registry
                    .get(step.uses)
                    .map(|runner| (runner, secrets))
            });
            let (runner, secrets) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    let record = StepRecord {
                        step_id: step.id.clone(),
                        action: step.uses,
                        status: StepStatus::Failed,
                        exit_code: None,
                        outputs: Outputs::new(),
                        duration_ms: 0,
                        error: Some(e.to_string()),
                    };
                    self.step_finished(run_id, &job.id, &record).await;
                    outcome.steps.push(record);
                    outcome.finish(JobStatus::Failed, Some(JobError::from(&e)));
                    return outcome;
                }
            };

            let mut ctx = StepContext::new(job.id.clone(), step.clone(), workspace.clone());
            ctx.git_ref = event.git_ref.clone();
            ctx.sha = event.sha.clone();
            ctx.toolchain = self.inner.config.toolchain.clone();
            ctx.variables = self.inner.config.variables.clone();
            ctx.variables.insert("CI".to_string(), "true".to_string());
            ctx.variables.insert("RELAY_JOB".to_string(), job.id.to_string());
            ctx.variables.insert("RELAY_REF".to_string(), event.git_ref.clone());
            ctx.secrets = secrets;
            ctx.cache = self.inner.cache.clone();

            let limit = step_limit(step, deadline);
            let started = Instant::now();
            let status = run_step(runner, &ctx, &credentials, limit, cancel).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (record, failure) = match status {
                StepRun::Finished(Ok(result)) if result.success => {
                    let record = step_record(
                        step,
                        StepStatus::Succeeded,
                        Some(result.exit_code),
                        result.outputs,
                        duration_ms,
                        None,
                    );
                    (record, None)
                }
                StepRun::Finished(Ok(result)) => {
                    let err = Error::StepFailed {
                        step: step.id.to_string(),
                        exit_code: result.exit_code,
                        message: format!("{} exited with code {}", step.uses, result.exit_code),
                    };
                    let record = step_record(
                        step,
                        StepStatus::Failed,
                        Some(result.exit_code),
                        result.outputs,
                        duration_ms,
                        Some(err.to_string()),
                    );
                    (record, Some((JobStatus::Failed, JobError::from(&err))))
                }
                StepRun::Finished(Err(e)) => {
                    let record = step_record(
                        step,
                        StepStatus::Failed,
                        None,
                        Outputs::new(),
                        duration_ms,
                        Some(e.to_string()),
                    );
                    (record, Some((JobStatus::Failed, JobError::from(&e))))
                }
                StepRun::TimedOut(limit_minutes) => {
                    let err = Error::StepTimeout {
                        step: step.id.to_string(),
                        minutes: limit_minutes,
                    };
                    let record = step_record(
                        step,
                        StepStatus::Failed,
                        None,
                        Outputs::new(),
                        duration_ms,
                        Some(err.to_string()),
                    );
                    (record, Some((JobStatus::Failed, JobError::from(&err))))
                }
                StepRun::Cancelled => {
                    let record = step_record(
                        step,
                        StepStatus::Cancelled,
                        None,
                        Outputs::new(),
                        duration_ms,
                        None,
                    );
                    (record, Some((JobStatus::Cancelled, cancelled_error(cancel))))
                }
            };

            info!(
                job = %job.id,
                step = %step.id,
                action = %step.uses,
                status = %record.status,
                duration_ms,
                "Step finished"
            );
            self.step_finished(run_id, &job.id, &record).await;
            step_outputs.insert(step.id.to_string(), record.outputs.clone());
            outcome.steps.push(record);

            if let Some((status, error)) = failure {
                outcome.finish(status, Some(error));
                return outcome;
            }
        }

        outcome.outputs = export_outputs(job, &outcome.steps);
        outcome.finish(JobStatus::Succeeded, None);
        outcome
    }

    /// Move a job to a terminal status and publish `JobFinished`.
    async fn settle(
        &self,
        run: &mut PipelineRun,
        job_id: &JobId,
        status: JobStatus,
        error: Option<JobError>,
    ) {
        let run_id = run.id;
        let Some(result) = run.result_mut(job_id.as_str()) else {
            return;
        };
        let moved = match error {
            Some(error) => result.finish_with_error(status, error),
            None => result.transition(status),
        };
        if let Err(e) = moved {
            warn!(job = %job_id, error = %e, "Ignoring status change");
            return;
        }

        debug!(
            job = %job_id,
            status = %result.status,
            duration_ms = result.duration_ms.unwrap_or(0),
            "Job settled"
        );
        let payload = JobFinishedPayload {
            run_id,
            job_id: job_id.clone(),
            status: result.status,
            duration_ms: result.duration_ms.unwrap_or(0),
            completed_at: result.completed_at.unwrap_or_else(Utc::now),
        };
        self.emit(RunEvent::JobFinished(payload)).await;
    }

    async fn step_finished(&self, run_id: RunId, job_id: &JobId, record: &StepRecord) {
        self.emit(RunEvent::StepFinished(StepFinishedPayload {
            run_id,
            job_id: job_id.clone(),
            step_id: record.step_id.clone(),
            status: record.status,
            exit_code: record.exit_code,
            duration_ms: record.duration_ms,
        }))
        .await;
    }

    async fn emit(&self, event: RunEvent) {
        if let Err(e) = self.inner.sink.publish(event).await {
            warn!(error = %e, "Failed to publish run event");
        }
    }
}

/// Statuses and outputs of a job's direct dependencies.
struct Upstream {
    jobs: HashMap<String, (JobStatus, Outputs)>,
}

impl Upstream {
    fn capture(run: &PipelineRun, job: &JobDefinition) -> Self {
        let jobs = job
            .needs
            .iter()
            .filter_map(|dep| {
                run.result(dep.as_str())
                    .map(|r| (dep.to_string(), (r.status, r.outputs.clone())))
            })
            .collect();
        Self { jobs }
    }
}

impl ConditionContext for Upstream {
    fn job_output(&self, job: &str, output: &str) -> Option<&OutputValue> {
        self.jobs.get(job).and_then(|(_, outputs)| outputs.get(output))
    }

    fn job_status(&self, job: &str) -> Option<JobStatus> {
        self.jobs.get(job).map(|(status, _)| *status)
    }

    fn step_output(&self, _step: &str, _output: &str) -> Option<&OutputValue> {
        None
    }
}

/// Condition view inside a running job: upstream jobs plus earlier steps.
struct StepView<'a> {
    upstream: &'a Upstream,
    steps: &'a HashMap<String, Outputs>,
}

impl ConditionContext for StepView<'_> {
    fn job_output(&self, job: &str, output: &str) -> Option<&OutputValue> {
        self.upstream.job_output(job, output)
    }

    fn job_status(&self, job: &str) -> Option<JobStatus> {
        self.upstream.job_status(job)
    }

    fn step_output(&self, step: &str, output: &str) -> Option<&OutputValue> {
        self.steps.get(step).and_then(|outputs| outputs.get(output))
    }
}

enum Gate {
    Run,
    Skipped(String),
    Blocked(String),
}

fn gate(job: &JobDefinition, upstream: &Upstream) -> Gate {
    for dep in &job.needs {
        match upstream.job_status(dep.as_str()) {
            Some(JobStatus::Failed | JobStatus::Blocked | JobStatus::Cancelled) | None => {
                return Gate::Blocked(dep.to_string());
            }
            _ => {}
        }
    }

    for dep in &job.needs {
        if upstream.job_status(dep.as_str()) == Some(JobStatus::Skipped) {
            let tested = job
                .condition
                .as_ref()
                .is_some_and(|c| c.tests_status_of(dep.as_str()));
            if !tested {
                return Gate::Skipped(format!("dependency '{}' was skipped", dep));
            }
        }
    }

    match &job.condition {
        Some(condition) if !condition.evaluate(upstream) => {
            Gate::Skipped("condition not met".to_string())
        }
        _ => Gate::Run,
    }
}

struct JobOutcome {
    status: JobStatus,
    outputs: Outputs,
    steps: Vec<StepRecord>,
    error: Option<JobError>,
}

impl JobOutcome {
    fn running() -> Self {
        Self {
            status: JobStatus::Running,
            outputs: Outputs::new(),
            steps: Vec::new(),
            error: None,
        }
    }

    fn failed(error: JobError) -> Self {
        let mut outcome = Self::running();
        outcome.finish(JobStatus::Failed, Some(error));
        outcome
    }

    fn finish(&mut self, status: JobStatus, error: Option<JobError>) {
        self.status = status;
        self.error = error;
    }
}

enum StepRun {
    Finished(relay_core::Result<StepResult>),
    /// Carries the limit that was exceeded, in minutes.
    TimedOut(u32),
    Cancelled,
}

fn minutes(m: u32) -> Duration {
    Duration::from_secs(u64::from(m) * 60)
}

/// The step's own limit, shortened to what is left of the job's limit.
/// A zero step limit means none.
fn step_limit(
    step: &StepDefinition,
    job_deadline: Option<(u32, Instant)>,
) -> Option<(u32, Duration)> {
    let own = (step.timeout_minutes > 0)
        .then(|| (step.timeout_minutes, minutes(step.timeout_minutes)));
    match (own, job_deadline) {
        (own, Some((job_minutes, deadline))) => {
            let left = deadline.saturating_duration_since(Instant::now());
            match own {
                Some((m, d)) if d <= left => Some((m, d)),
                _ => Some((job_minutes, left)),
            }
        }
        (own, None) => own,
    }
}

/// Run one step with its output forwarded to the log, masked.
async fn run_step(
    runner: Arc<dyn StepRunner>,
    ctx: &StepContext,
    credentials: &JobCredentials,
    limit: Option<(u32, Duration)>,
    cancel: &CancelToken,
) -> StepRun {
    let (tx, mut rx) = mpsc::channel::<OutputLine>(256);

    let forward = async {
        while let Some(line) = rx.recv().await {
            let content = credentials.mask(&line.content);
            match line.stream {
                OutputStream::Stdout => debug!(
                    job = %ctx.job_id,
                    step = %ctx.step.id,
                    line = line.line_number,
                    "{}",
                    content
                ),
                OutputStream::Stderr => debug!(
                    job = %ctx.job_id,
                    step = %ctx.step.id,
                    line = line.line_number,
                    stream = "stderr",
                    "{}",
                    content
                ),
            }
        }
    };

    let execute = async {
        let timer = async {
            match limit {
                Some((_, duration)) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            result = runner.execute(ctx, tx) => StepRun::Finished(result),
            _ = timer => StepRun::TimedOut(limit.map(|(m, _)| m).unwrap_or(0)),
            _ = cancel.cancelled() => StepRun::Cancelled,
        }
    };

    let (status, ()) = tokio::join!(execute, forward);
    status
}

fn step_record(
    step: &StepDefinition,
    status: StepStatus,
    exit_code: Option<i32>,
    outputs: Outputs,
    duration_ms: u64,
    error: Option<String>,
) -> StepRecord {
    StepRecord {
        step_id: step.id.clone(),
        action: step.uses,
        status,
        exit_code,
        outputs,
        duration_ms,
        error,
    }
}

fn cancelled_error(cancel: &CancelToken) -> JobError {
    JobError::new(
        JobErrorKind::Cancelled,
        cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
    )
}

/// A job's exported outputs: each declared name from the last step that set it.
fn export_outputs(job: &JobDefinition, steps: &[StepRecord]) -> Outputs {
    let mut outputs = Outputs::new();
    for name in &job.outputs {
        if let Some(value) = steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Succeeded)
            .find_map(|s| s.outputs.get(name))
        {
            outputs.insert(name.clone(), value.clone());
        }
    }
    outputs
}
