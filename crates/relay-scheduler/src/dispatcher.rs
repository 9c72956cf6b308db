//! Event dispatch.
//!
//! The dispatcher resolves a raw event, runs the selected pipelines in
//! `requires` order and keeps one cancellation handle per
//! `(repository, git_ref)`: a newer event for the same ref cancels the run
//! still in flight for it.

use crate::cancel::{CancelHandle, CancelToken};
use crate::catalog::{LoadedPipeline, PipelineCatalog};
use crate::executor::PipelineExecutor;
use crate::report::{RunReport, overall_status};
use crate::triggers::TriggerPolicy;
use futures::future::join_all;
use relay_core::ids::{DispatchId, PipelineId};
use relay_core::run::{JobError, JobErrorKind, JobResult, JobStatus, PipelineRun, RunStatus};
use relay_core::secrets::GrantedScope;
use relay_core::trigger::{Event, RawEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

type RefKey = (String, String);

/// Everything dispatched for one event.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub id: DispatchId,
    pub event: Event,
    pub scope: GrantedScope,
    /// One run per selected pipeline, in `requires` order.
    pub runs: Vec<PipelineRun>,
}

impl DispatchOutcome {
    pub fn status(&self) -> RunStatus {
        overall_status(self.runs.iter().map(|r| r.status))
    }

    pub fn run(&self, pipeline: &str) -> Option<&PipelineRun> {
        self.runs.iter().find(|r| r.pipeline.as_str() == pipeline)
    }

    pub fn report(&self) -> RunReport {
        RunReport::new(
            self.event.kind,
            &self.event.git_ref,
            &self.event.repository,
            &self.runs,
        )
    }
}

/// A resolved event, registered for its ref and waiting to run.
#[derive(Debug)]
pub struct Admission {
    id: DispatchId,
    event: Event,
    scope: GrantedScope,
    pipelines: Vec<PipelineId>,
    /// `None` when the event selected no pipelines.
    token: Option<CancelToken>,
}

impl Admission {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn pipelines(&self) -> &[PipelineId] {
        &self.pipelines
    }
}

pub struct Dispatcher {
    catalog: Arc<PipelineCatalog>,
    policy: TriggerPolicy,
    executor: PipelineExecutor,
    in_flight: Mutex<HashMap<RefKey, (DispatchId, CancelHandle)>>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<PipelineCatalog>,
        policy: TriggerPolicy,
        executor: PipelineExecutor,
    ) -> Self {
        Self {
            catalog,
            policy,
            executor,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &TriggerPolicy {
        &self.policy
    }

    /// Resolve and run everything an event triggers.
    pub async fn dispatch(&self, raw: RawEvent) -> DispatchOutcome {
        let admission = self.admit(raw).await;
        self.execute(admission).await
    }

    /// Resolve an event and register it for its ref, superseding the
    /// dispatch in flight for that ref. Nothing runs until [`Self::execute`].
    ///
    /// Admitting events one at a time fixes their order: of two admitted
    /// events for the same ref, the later one always wins.
    pub async fn admit(&self, raw: RawEvent) -> Admission {
        let resolution = self.policy.resolve(&raw, self.catalog.definitions());
        let id = DispatchId::new();
        let event = resolution.event;
        let scope = resolution.scope;

        info!(
            dispatch_id = %id,
            kind = %event.kind,
            git_ref = %event.git_ref,
            repository = %event.repository,
            scope = %scope.level,
            pipelines = resolution.pipelines.len(),
            "Dispatching event"
        );

        let token = if resolution.pipelines.is_empty() {
            info!(dispatch_id = %id, "No pipelines triggered");
            None
        } else {
            Some(self.register(event.ref_key(), id).await)
        };

        Admission {
            id,
            event,
            scope,
            pipelines: resolution.pipelines,
            token,
        }
    }

    /// Run an admitted event's pipelines.
    pub async fn execute(&self, admission: Admission) -> DispatchOutcome {
        let Admission {
            id,
            event,
            scope,
            pipelines,
            token,
        } = admission;

        let Some(token) = token else {
            return DispatchOutcome {
                id,
                event,
                scope,
                runs: Vec::new(),
            };
        };

        let runs = self.run_selected(&pipelines, &event, &scope, token).await;

        let key = event.ref_key();
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.get(&key).is_some_and(|(current, _)| *current == id) {
                in_flight.remove(&key);
            }
        }

        let outcome = DispatchOutcome {
            id,
            event,
            scope,
            runs,
        };
        info!(dispatch_id = %id, status = %outcome.status(), "Dispatch finished");
        outcome
    }

    /// Cancel whatever is running for a ref. Returns whether anything was.
    pub async fn cancel_ref(&self, repository: &str, git_ref: &str, reason: &str) -> bool {
        let key = (repository.to_string(), git_ref.to_string());
        match self.in_flight.lock().await.get(&key) {
            Some((id, handle)) => {
                info!(
                    dispatch_id = %id,
                    git_ref = %git_ref,
                    reason = %reason,
                    "Cancelling dispatch"
                );
                handle.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// Cancel every dispatch in flight.
    pub async fn cancel_all(&self, reason: &str) {
        for (id, handle) in self.in_flight.lock().await.values() {
            info!(dispatch_id = %id, reason = %reason, "Cancelling dispatch");
            handle.cancel(reason);
        }
    }

    /// Track a new dispatch for `key`, superseding the previous one.
    async fn register(&self, key: RefKey, id: DispatchId) -> CancelToken {
        let (handle, token) = CancelHandle::new();
        let previous = self.in_flight.lock().await.insert(key.clone(), (id, handle));
        if let Some((previous_id, previous)) = previous {
            info!(
                dispatch_id = %previous_id,
                superseded_by = %id,
                repository = %key.0,
                git_ref = %key.1,
                "Superseding in-flight dispatch"
            );
            previous.cancel(format!("superseded by dispatch {}", id));
        }
        token
    }

    async fn run_selected(
        &self,
        selected: &[PipelineId],
        event: &Event,
        scope: &GrantedScope,
        token: CancelToken,
    ) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = Vec::new();

        for level in self.catalog.levels_for(selected) {
            let mut pending = Vec::new();
            for name in &level {
                let Some(pipeline) = self.catalog.get(name.as_str()) else {
                    continue;
                };
                let unmet = if token.is_cancelled() {
                    None
                } else {
                    unmet_requirement(pipeline, selected, &runs)
                };
                pending.push((Arc::clone(pipeline), unmet));
            }

            let level_runs = join_all(pending.into_iter().map(|(pipeline, unmet)| {
                let token = token.clone();
                async move {
                    match unmet {
                        Some(reason) => {
                            warn!(
                                pipeline = %pipeline.name(),
                                reason = %reason,
                                "Pipeline blocked"
                            );
                            blocked_run(&pipeline, event, &reason)
                        }
                        None => self.executor.execute(&pipeline, event, scope, token).await,
                    }
                }
            }))
            .await;
            runs.extend(level_runs);
        }

        runs
    }
}

/// Why a pipeline may not run, if one of its required pipelines did not
/// succeed on this event.
fn unmet_requirement(
    pipeline: &LoadedPipeline,
    selected: &[PipelineId],
    runs: &[PipelineRun],
) -> Option<String> {
    pipeline.definition.requires.iter().find_map(|required| {
        if !selected.contains(required) {
            return Some(format!(
                "required pipeline '{}' was not triggered by this event",
                required
            ));
        }
        match runs.iter().find(|r| &r.pipeline == required) {
            Some(run) if run.status == RunStatus::Succeeded => None,
            Some(run) => Some(format!(
                "required pipeline '{}' finished {}",
                required, run.status
            )),
            None => Some(format!("required pipeline '{}' did not run", required)),
        }
    })
}

/// A run in which no job started because a required pipeline did not succeed.
fn blocked_run(pipeline: &LoadedPipeline, event: &Event, reason: &str) -> PipelineRun {
    let mut run = PipelineRun::new(pipeline.name().clone(), event.clone());
    for job_id in pipeline.graph.topological_order() {
        let mut result = JobResult::new(job_id);
        if let Err(e) = result.finish_with_error(
            JobStatus::Blocked,
            JobError::new(JobErrorKind::DependencyFailed, reason),
        ) {
            warn!(error = %e, "Could not block job");
        }
        run.results.push(result);
    }
    run.finish();
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_document;
    use relay_core::trigger::EventKind;

    fn catalog() -> PipelineCatalog {
        let defs = parse_document(
            r#"
pipelines:
  - name: ci
    jobs: [{ id: test, steps: [{ id: t, uses: test }] }]
  - name: release
    on: [{ kind: push_to_main }]
    requires: [ci]
    jobs:
      - id: release
        steps: [{ id: r, uses: release }]
      - id: publish
        needs: [release]
        permissions: [registry_token]
        steps: [{ id: p, uses: publish, credentials: [registry_token] }]
"#,
            "test.yaml",
        )
        .unwrap();
        PipelineCatalog::from_definitions(defs).unwrap()
    }

    fn event() -> Event {
        Event::new(EventKind::PushToMain, "main", "acme/widget", "octo")
    }

    #[test]
    fn test_blocked_run_fails_every_job() {
        let catalog = catalog();
        let run = blocked_run(
            catalog.get("release").unwrap(),
            &event(),
            "required pipeline 'ci' finished failed",
        );
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.results.len(), 2);
        assert!(run.results.iter().all(|r| r.status == JobStatus::Blocked));
        assert_eq!(
            run.results[0].error.as_ref().unwrap().kind,
            JobErrorKind::DependencyFailed
        );
    }

    #[test]
    fn test_unmet_requirement() {
        let catalog = catalog();
        let release = catalog.get("release").unwrap();
        let selected = vec![PipelineId::new("ci"), PipelineId::new("release")];

        let reason = unmet_requirement(release, &[PipelineId::new("release")], &[]).unwrap();
        assert!(reason.contains("not triggered"));

        let mut ci = PipelineRun::new(PipelineId::new("ci"), event());
        ci.finish();
        assert_eq!(ci.status, RunStatus::Succeeded);
        assert!(unmet_requirement(release, &selected, std::slice::from_ref(&ci)).is_none());

        ci.cancelled = true;
        ci.finish();
        let reason = unmet_requirement(release, &selected, &[ci]).unwrap();
        assert_eq!(reason, "required pipeline 'ci' finished cancelled");
    }
}
