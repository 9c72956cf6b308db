//! Serialization tests for relay-core types.

use chrono::Utc;
use pretty_assertions::assert_eq;
use relay_core::condition::Condition;
use relay_core::events::*;
use relay_core::ids::*;
use relay_core::pipeline::*;
use relay_core::run::*;
use relay_core::trigger::EventKind;

const RELEASE_PIPELINE: &str = r#"
name: release
description: Compute and publish a release
on:
  - kind: push_to_main
requires: [ci]
jobs:
  - id: release
    steps:
      - id: compute
        uses: release
        outputs: [release_created, tag_name, version]
    outputs: [release_created, tag_name, version]
  - id: publish
    needs: [release]
    if:
      equals: { job: release, output: release_created, value: true }
    permissions: [registry_token]
    cache:
      paths: [~/.cargo/registry, target]
    steps:
      - id: checkout
        uses: checkout
        with:
          ref: main
      - id: push
        uses: publish
        credentials: [registry_token]
        timeout_minutes: 10
"#;

#[test]
fn test_pipeline_definition_from_yaml() {
    let def: PipelineDefinition = serde_yaml::from_str(RELEASE_PIPELINE).expect("parse");

    assert_eq!(def.name.as_str(), "release");
    assert_eq!(def.on.len(), 1);
    assert_eq!(def.on[0].kind, EventKind::PushToMain);
    assert!(def.on[0].branches.is_empty());
    assert_eq!(def.requires, vec![PipelineId::new("ci")]);

    let publish = def.job("publish").expect("publish job");
    assert_eq!(publish.needs, vec![JobId::new("release")]);
    assert_eq!(
        publish.condition,
        Some(Condition::equals("release", "release_created", true))
    );
    assert_eq!(publish.permissions, vec![CredentialName::new("registry_token")]);

    let cache = publish.cache.as_ref().expect("cache block");
    assert_eq!(cache.lock_files, vec!["Cargo.lock".to_string()]);
    assert_eq!(cache.prefix, "v0-rust");
    assert!(cache.partition.is_none());

    let checkout = &publish.steps[0];
    assert_eq!(checkout.uses, ActionKind::Checkout);
    assert_eq!(checkout.param_str("ref"), Some("main"));
    assert_eq!(checkout.timeout_minutes, 30);
    assert_eq!(publish.steps[1].timeout_minutes, 10);
}

#[test]
fn test_unknown_action_is_rejected() {
    let yaml = r#"
name: ci
jobs:
  - id: lint
    steps:
      - id: fmt
        uses: deploy_to_mars
"#;
    assert!(serde_yaml::from_str::<PipelineDefinition>(yaml).is_err());
}

#[test]
fn test_job_result_json_shape() {
    let mut result = JobResult::new(JobId::new("release"));
    result.transition(JobStatus::Running).unwrap();
    result
        .outputs
        .insert("release_created".into(), OutputValue::Bool(true));
    result
        .outputs
        .insert("version".into(), OutputValue::Text("1.4.0".into()));
    result.transition(JobStatus::Succeeded).unwrap();

    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["outputs"]["release_created"], true);
    assert_eq!(json["outputs"]["version"], "1.4.0");

    let parsed: JobResult = serde_json::from_value(json).expect("deserialize");
    assert_eq!(parsed.outputs, result.outputs);
}

#[test]
fn test_run_event_is_tagged() {
    let event = RunEvent::JobFinished(JobFinishedPayload {
        run_id: RunId::new(),
        job_id: JobId::new("lint"),
        status: JobStatus::Blocked,
        duration_ms: 0,
        completed_at: Utc::now(),
    });

    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["type"], "job_finished");
    assert_eq!(json["status"], "blocked");
    assert!(event.subject().ends_with(".job.lint.finished"));
}
