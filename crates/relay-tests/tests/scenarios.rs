//! End-to-end dispatch scenarios over fake actions.

use pretty_assertions::assert_eq;
use relay_core::events::RunEvent;
use relay_core::pipeline::ActionKind;
use relay_core::run::{JobErrorKind, JobStatus, OutputValue, RunStatus};
use relay_core::secrets::AccessLevel;
use relay_tests::fixtures::REPOSITORY;
use relay_tests::{
    Behavior, EventFixture, FakeAction, Harness, PipelineFixture, init_test_logging, wait_for,
};
use std::time::Duration;

fn status_of(outcome: &relay_scheduler::DispatchOutcome, pipeline: &str, job: &str) -> JobStatus {
    outcome
        .run(pipeline)
        .and_then(|run| run.result(job))
        .map(|r| r.status)
        .unwrap_or_else(|| panic!("no result for {pipeline}/{job}"))
}

fn release_action(created: bool) -> FakeAction {
    let action = FakeAction::new(ActionKind::Release);
    if created {
        action.outputs([
            ("release_created", OutputValue::Bool(true)),
            ("tag_name", OutputValue::from("v1.3.0")),
            ("version", OutputValue::from("1.3.0")),
        ])
    } else {
        action.outputs([("release_created", false)])
    }
}

#[tokio::test]
async fn test_feature_branch_push_runs_only_ci() {
    init_test_logging();
    let harness = Harness::builder(PipelineFixture::all()).build().unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_branch("feature/parser")).await;

    assert_eq!(outcome.scope.level, AccessLevel::Read);
    assert_eq!(outcome.runs.len(), 1);
    assert!(outcome.run("release").is_none());
    assert_eq!(outcome.status(), RunStatus::Succeeded);
    assert_eq!(status_of(&outcome, "ci", "lint"), JobStatus::Succeeded);
    assert_eq!(status_of(&outcome, "ci", "test"), JobStatus::Succeeded);
    assert_eq!(harness.action(ActionKind::Lint).call_count(), 1);
    assert_eq!(harness.action(ActionKind::Test).call_count(), 1);
    assert_eq!(harness.action(ActionKind::Release).call_count(), 0);
}

#[tokio::test]
async fn test_main_push_without_release_skips_publish() {
    init_test_logging();
    let harness = Harness::builder(PipelineFixture::all())
        .action(release_action(false))
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_main()).await;

    assert_eq!(outcome.scope.level, AccessLevel::Publish);
    assert_eq!(outcome.runs.len(), 2);
    assert_eq!(status_of(&outcome, "release", "release"), JobStatus::Succeeded);
    assert_eq!(status_of(&outcome, "release", "publish"), JobStatus::Skipped);
    assert_eq!(harness.action(ActionKind::Publish).call_count(), 0);
    assert_eq!(harness.action(ActionKind::Checkout).calls_for("publish"), 0);

    let release = outcome.run("release").unwrap();
    assert!(release.result("publish").unwrap().steps.is_empty());
    assert_eq!(
        release.result("release").unwrap().outputs.get("release_created"),
        Some(&OutputValue::Bool(false))
    );
    assert_eq!(release.status, RunStatus::Succeeded);
    assert_eq!(outcome.status(), RunStatus::Succeeded);
}

#[tokio::test]
async fn test_main_push_with_release_publishes_with_credential() {
    init_test_logging();
    let harness = Harness::builder(PipelineFixture::all())
        .action(release_action(true))
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_main()).await;

    assert_eq!(status_of(&outcome, "release", "publish"), JobStatus::Succeeded);
    assert_eq!(outcome.status(), RunStatus::Succeeded);

    let publish_calls = harness.action(ActionKind::Publish).invocations();
    assert_eq!(publish_calls.len(), 1);
    assert_eq!(
        publish_calls[0].secrets.get("REGISTRY_TOKEN").map(String::as_str),
        Some("reg-secret-0042")
    );
    assert_eq!(publish_calls[0].secrets.len(), 1);

    // Steps that do not list the credential never see it.
    for call in harness.action(ActionKind::Checkout).invocations() {
        assert!(call.secrets.is_empty(), "checkout in {} saw secrets", call.job);
    }
    for call in harness.action(ActionKind::Lint).invocations() {
        assert!(call.secrets.is_empty());
    }

    let release = outcome.run("release").unwrap();
    assert_eq!(
        release.result("release").unwrap().outputs.get("tag_name"),
        Some(&OutputValue::from("v1.3.0"))
    );
}

#[tokio::test]
async fn test_lint_failure_blocks_release_but_test_runs() {
    init_test_logging();
    let harness = Harness::builder(PipelineFixture::all())
        .action(FakeAction::new(ActionKind::Lint).behave(Behavior::Fail(1)))
        .action(release_action(true))
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_main()).await;

    assert_eq!(status_of(&outcome, "ci", "lint"), JobStatus::Failed);
    assert_eq!(status_of(&outcome, "ci", "test"), JobStatus::Succeeded);
    assert_eq!(harness.action(ActionKind::Test).call_count(), 1);

    let lint = outcome.run("ci").unwrap().result("lint").unwrap();
    assert_eq!(lint.error.as_ref().unwrap().kind, JobErrorKind::StepFailed);
    // The failing step aborts the rest of the job, including the cache save.
    let step_ids: Vec<&str> = lint.steps.iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(step_ids, vec!["cache-restore", "checkout", "toolchain", "lint"]);
    assert_eq!(harness.action(ActionKind::CacheSave).call_count(), 0);

    assert_eq!(status_of(&outcome, "release", "release"), JobStatus::Blocked);
    assert_eq!(status_of(&outcome, "release", "publish"), JobStatus::Blocked);
    assert_eq!(harness.action(ActionKind::Release).call_count(), 0);
    assert_eq!(harness.action(ActionKind::Publish).call_count(), 0);
    assert_eq!(outcome.run("release").unwrap().status, RunStatus::Failed);
    assert_eq!(outcome.status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_failed_job_blocks_dependents_but_not_siblings() {
    init_test_logging();
    let definitions = PipelineFixture::parse(
        r#"
name: graph
jobs:
  - id: a
    steps: [{ id: a, uses: run }]
  - id: b
    needs: [a]
    steps: [{ id: b, uses: run }]
  - id: c
    steps: [{ id: c, uses: run }]
  - id: d
    needs: [b, c]
    steps: [{ id: d, uses: run }]
"#,
    );
    let harness = Harness::builder(definitions)
        .action(FakeAction::new(ActionKind::Run).on_step("a", Behavior::Fail(2)))
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_branch("dev")).await;

    assert_eq!(status_of(&outcome, "graph", "a"), JobStatus::Failed);
    assert_eq!(status_of(&outcome, "graph", "b"), JobStatus::Blocked);
    assert_eq!(status_of(&outcome, "graph", "c"), JobStatus::Succeeded);
    assert_eq!(status_of(&outcome, "graph", "d"), JobStatus::Blocked);

    let run = harness.action(ActionKind::Run);
    assert_eq!(run.calls_for("b"), 0);
    assert_eq!(run.calls_for("c"), 1);
    assert_eq!(run.calls_for("d"), 0);

    let b = outcome.run("graph").unwrap().result("b").unwrap();
    assert_eq!(b.error.as_ref().unwrap().kind, JobErrorKind::DependencyFailed);
    assert_eq!(outcome.status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_skip_propagates_unless_status_is_tested() {
    init_test_logging();
    let definitions = PipelineFixture::parse(
        r#"
name: gated
jobs:
  - id: detect
    outputs: [enabled]
    steps: [{ id: detect, uses: run, outputs: [enabled] }]
  - id: optional
    needs: [detect]
    if: { equals: { job: detect, output: enabled, value: true } }
    steps: [{ id: optional, uses: run }]
  - id: follower
    needs: [optional]
    steps: [{ id: follower, uses: run }]
  - id: fallback
    needs: [optional]
    if: { status: { job: optional, is: skipped } }
    steps: [{ id: fallback, uses: run }]
"#,
    );
    let harness = Harness::builder(definitions)
        .action(FakeAction::new(ActionKind::Run).on_step(
            "detect",
            Behavior::Succeed([("enabled".to_string(), OutputValue::Bool(false))].into()),
        ))
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_branch("dev")).await;

    assert_eq!(status_of(&outcome, "gated", "detect"), JobStatus::Succeeded);
    assert_eq!(status_of(&outcome, "gated", "optional"), JobStatus::Skipped);
    assert_eq!(status_of(&outcome, "gated", "follower"), JobStatus::Skipped);
    assert_eq!(status_of(&outcome, "gated", "fallback"), JobStatus::Succeeded);

    let run = harness.action(ActionKind::Run);
    assert_eq!(run.calls_for("optional"), 0);
    assert_eq!(run.calls_for("follower"), 0);
    assert_eq!(run.calls_for("fallback"), 1);
    assert_eq!(outcome.status(), RunStatus::Succeeded);
}

#[tokio::test]
async fn test_permission_denied_before_any_step() {
    init_test_logging();
    let definitions = PipelineFixture::parse(
        r#"
name: pr
on: [{ kind: pull_request }]
jobs:
  - id: sneaky
    permissions: [registry_token]
    steps: [{ id: push, uses: publish, credentials: [registry_token] }]
  - id: undeclared
    steps: [{ id: peek, uses: run, credentials: [github_token] }]
  - id: honest
    permissions: [github_token]
    steps: [{ id: status, uses: run, credentials: [github_token] }]
"#,
    );
    let harness = Harness::builder(definitions).build().unwrap();

    let outcome = harness.dispatch(EventFixture::pull_request(42)).await;

    assert_eq!(outcome.scope.level, AccessLevel::Read);
    let run = outcome.run("pr").unwrap();
    for job in ["sneaky", "undeclared"] {
        let result = run.result(job).unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.error.as_ref().unwrap().kind, JobErrorKind::PermissionDenied);
        assert!(result.steps.is_empty());
    }
    assert_eq!(harness.action(ActionKind::Publish).call_count(), 0);

    let run_action = harness.action(ActionKind::Run);
    assert_eq!(run_action.calls_for("undeclared"), 0);
    let honest = run_action.invocations();
    assert_eq!(honest.len(), 1);
    assert_eq!(
        honest[0].secrets.get("GITHUB_TOKEN").map(String::as_str),
        Some("gh-secret-0042")
    );
    assert_eq!(run.result("honest").unwrap().status, JobStatus::Succeeded);
}

#[tokio::test]
async fn test_fork_push_to_main_cannot_publish() {
    init_test_logging();
    let harness = Harness::builder(PipelineFixture::all()).build().unwrap();

    let outcome = harness.dispatch(EventFixture::fork_push_to_main()).await;

    assert_eq!(outcome.scope.level, AccessLevel::Read);
    assert!(outcome.run("release").is_none());
    assert_eq!(outcome.runs.len(), 1);
}

#[tokio::test]
async fn test_newer_event_supersedes_in_flight_run() {
    init_test_logging();
    let definitions = PipelineFixture::parse(
        r#"
name: slow
jobs:
  - id: build
    steps: [{ id: build, uses: run }]
  - id: deploy
    needs: [build]
    steps: [{ id: deploy, uses: run }]
"#,
    );
    let harness = Harness::builder(definitions)
        .action(FakeAction::new(ActionKind::Run).first_call(Behavior::Hang))
        .build()
        .unwrap();

    let dispatcher = harness.dispatcher.clone();
    let first = tokio::spawn(async move {
        dispatcher
            .dispatch(EventFixture::push_to_branch("dev"))
            .await
    });

    let run_action = harness.action(ActionKind::Run);
    let started = wait_for(Duration::from_secs(5), Duration::from_millis(10), || {
        let run_action = run_action.clone();
        async move { run_action.call_count() == 1 }
    })
    .await;
    assert!(started, "first run never started");

    let second = harness.dispatch(EventFixture::push_to_branch("dev")).await;
    let first = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .expect("superseded run did not stop")
        .unwrap();

    assert_eq!(second.status(), RunStatus::Succeeded);
    assert_eq!(first.status(), RunStatus::Cancelled);

    let run = first.run("slow").unwrap();
    assert!(run.cancelled);
    assert_eq!(run.result("build").unwrap().status, JobStatus::Cancelled);
    assert_eq!(run.result("deploy").unwrap().status, JobStatus::Cancelled);
    assert!(
        run.result("build")
            .unwrap()
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("superseded")
    );
}

#[tokio::test]
async fn test_cancel_ref_stops_only_that_ref() {
    init_test_logging();
    let definitions = PipelineFixture::parse(
        r#"
name: slow
jobs:
  - id: build
    steps: [{ id: build, uses: run }]
"#,
    );
    let harness = Harness::builder(definitions)
        .action(FakeAction::new(ActionKind::Run).first_call(Behavior::Hang))
        .build()
        .unwrap();

    let dispatcher = harness.dispatcher.clone();
    let hung = tokio::spawn(async move {
        dispatcher
            .dispatch(EventFixture::push_to_branch("dev"))
            .await
    });

    let run_action = harness.action(ActionKind::Run);
    let started = wait_for(Duration::from_secs(5), Duration::from_millis(10), || {
        let run_action = run_action.clone();
        async move { run_action.call_count() == 1 }
    })
    .await;
    assert!(started, "run never started");

    let dispatcher = &harness.dispatcher;
    assert!(
        !dispatcher
            .cancel_ref(REPOSITORY, "refs/heads/other", "stop")
            .await
    );
    assert!(
        dispatcher
            .cancel_ref(REPOSITORY, "refs/heads/dev", "operator abort")
            .await
    );

    let hung = tokio::time::timeout(Duration::from_secs(5), hung)
        .await
        .expect("cancelled run did not stop")
        .unwrap();
    assert_eq!(hung.status(), RunStatus::Cancelled);
    let build = hung.run("slow").unwrap().result("build").unwrap();
    assert_eq!(build.status, JobStatus::Cancelled);
    assert!(
        build
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("operator abort")
    );

    // Finished dispatches are no longer tracked.
    assert!(
        !dispatcher
            .cancel_ref(REPOSITORY, "refs/heads/dev", "again")
            .await
    );
}

#[test]
fn test_publish_without_listed_credential_is_rejected() {
    let definitions = PipelineFixture::parse(
        r#"
name: leaky
jobs:
  - id: ship
    permissions: [registry_token]
    steps:
      - { id: prep, uses: run }
      - { id: push, uses: publish }
"#,
    );
    let Err(err) = Harness::builder(definitions).build() else {
        panic!("catalog accepted a publish step without its credential");
    };
    let message = err.to_string();
    assert!(message.contains("'push'"), "{message}");
    assert!(message.contains("'registry_token'"), "{message}");
}

#[tokio::test]
async fn test_lifecycle_events_bracket_the_run() {
    init_test_logging();
    let harness = Harness::builder(vec![PipelineFixture::ci()])
        .max_parallel_jobs(1)
        .build()
        .unwrap();

    let outcome = harness.dispatch(EventFixture::push_to_branch("dev")).await;
    assert_eq!(outcome.status(), RunStatus::Succeeded);

    let events = harness.sink.events().await;
    assert!(matches!(events.first(), Some(RunEvent::RunStarted(_))));
    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished(p)) if p.status == RunStatus::Succeeded
    ));

    let started = events
        .iter()
        .filter(|e| matches!(e, RunEvent::JobStarted(_)))
        .count();
    let finished = events
        .iter()
        .filter(|e| matches!(e, RunEvent::JobFinished(_)))
        .count();
    assert_eq!(started, 2);
    assert_eq!(finished, 2);

    // lint: cache-restore, checkout, toolchain, lint, cache-save; test: 3 steps
    let steps = events
        .iter()
        .filter(|e| matches!(e, RunEvent::StepFinished(_)))
        .count();
    assert_eq!(steps, 8);
}

#[tokio::test]
async fn test_cyclic_pipeline_never_loads() {
    let definitions = PipelineFixture::parse(
        r#"
name: loop
jobs:
  - { id: a, needs: [b], steps: [{ id: a, uses: run }] }
  - { id: b, needs: [a], steps: [{ id: b, uses: run }] }
"#,
    );
    let err = Harness::builder(definitions).build().err().unwrap();
    assert!(err.to_string().contains("Cycle detected in pipeline 'loop'"));
}

#[tokio::test]
async fn test_tag_push_triggers_nothing() {
    let harness = Harness::builder(PipelineFixture::all()).build().unwrap();
    let outcome = harness
        .dispatch(relay_core::trigger::RawEvent::push(
            "refs/tags/v1.3.0",
            relay_tests::fixtures::REPOSITORY,
        ))
        .await;
    assert!(outcome.runs.is_empty());
    assert_eq!(outcome.status(), RunStatus::Succeeded);
    assert!(harness.sink.is_empty().await);
}
