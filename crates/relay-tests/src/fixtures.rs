//! Pipeline and event fixtures.

use relay_core::pipeline::PipelineDefinition;
use relay_core::trigger::RawEvent;
use relay_scheduler::TriggerPolicy;
use relay_scheduler::catalog::parse_document;

/// Repository the fixture policy treats as canonical.
pub const REPOSITORY: &str = "acme/widget";

/// Lint and test on every push and pull request.
pub const CI_PIPELINE: &str = r#"
name: ci
description: Lint and test
on:
  - kind: push_any_branch
  - kind: pull_request
jobs:
  - id: lint
    cache:
      paths: [target]
    steps:
      - { id: checkout, uses: checkout }
      - { id: toolchain, uses: toolchain, with: { components: [rustfmt, clippy] } }
      - { id: lint, uses: lint }
  - id: test
    steps:
      - { id: checkout, uses: checkout }
      - { id: toolchain, uses: toolchain }
      - { id: test, uses: test }
"#;

/// Compute a release on main and publish it when one was created.
pub const RELEASE_PIPELINE: &str = r#"
name: release
description: Release and publish
on:
  - kind: push_to_main
requires: [ci]
jobs:
  - id: release
    outputs: [release_created, tag_name, version]
    steps:
      - { id: checkout, uses: checkout }
      - id: compute
        uses: release
        with: { command: ./scripts/release-plan.sh }
        outputs: [release_created, tag_name, version]
  - id: publish
    needs: [release]
    if:
      equals: { job: release, output: release_created, value: true }
    permissions: [registry_token]
    steps:
      - { id: checkout, uses: checkout }
      - { id: toolchain, uses: toolchain }
      - id: publish
        uses: publish
        credentials: [registry_token]
"#;

/// Factory for pipeline definitions.
pub struct PipelineFixture;

impl PipelineFixture {
    pub fn ci() -> PipelineDefinition {
        Self::parse_one(CI_PIPELINE)
    }

    pub fn release() -> PipelineDefinition {
        Self::parse_one(RELEASE_PIPELINE)
    }

    /// The ci and release pipelines.
    pub fn all() -> Vec<PipelineDefinition> {
        vec![Self::ci(), Self::release()]
    }

    /// Parse YAML holding one pipeline or a `pipelines:` list.
    pub fn parse(yaml: &str) -> Vec<PipelineDefinition> {
        match parse_document(yaml, "fixture") {
            Ok(definitions) => definitions,
            Err(e) => panic!("invalid fixture pipeline: {e}"),
        }
    }

    fn parse_one(yaml: &str) -> PipelineDefinition {
        Self::parse(yaml).remove(0)
    }

    /// Policy granting `github_token` to every event and `registry_token` to
    /// pushes to main.
    pub fn policy() -> TriggerPolicy {
        TriggerPolicy::new(REPOSITORY)
            .with_read_credential("github_token")
            .with_publish_credential("registry_token")
    }
}

/// Factory for raw events.
pub struct EventFixture;

impl EventFixture {
    pub fn push_to_main() -> RawEvent {
        RawEvent::push("refs/heads/main", REPOSITORY)
            .with_actor("octo")
            .with_sha("4f2a9c1")
    }

    pub fn push_to_branch(branch: &str) -> RawEvent {
        RawEvent::push(format!("refs/heads/{branch}"), REPOSITORY).with_actor("octo")
    }

    pub fn pull_request(number: u32) -> RawEvent {
        RawEvent::pull_request(format!("refs/pull/{number}/merge"), REPOSITORY)
            .with_actor("contributor")
    }

    pub fn fork_push_to_main() -> RawEvent {
        RawEvent::push("refs/heads/main", "mallory/widget").with_actor("mallory")
    }
}
