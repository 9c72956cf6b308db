//! Lint and test actions: fixed default commands, overridable by `command`.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use crate::shell::ShellRunner;
use async_trait::async_trait;
use relay_core::Result;
use relay_core::pipeline::ActionKind;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub const DEFAULT_LINT_COMMANDS: &[&str] = &[
    "cargo fmt --all -- --check",
    "cargo clippy --all-targets -- -D warnings",
];

pub const DEFAULT_TEST_COMMANDS: &[&str] = &["cargo test --all-features"];

fn commands_for(ctx: &StepContext, defaults: &[&str]) -> Vec<String> {
    let overridden = ctx.step.param_list("command");
    if overridden.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        overridden
    }
}

/// Code quality checks. Pass/fail only.
#[derive(Default)]
pub struct LintAction {
    shell: ShellRunner,
}

impl LintAction {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepRunner for LintAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let commands = commands_for(ctx, DEFAULT_LINT_COMMANDS);
        self.shell
            .run_commands(&commands, ctx, &HashMap::new(), output_tx)
            .await
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Lint
    }
}

/// Test suite. Pass/fail only.
#[derive(Default)]
pub struct TestAction {
    shell: ShellRunner,
}

impl TestAction {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepRunner for TestAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let commands = commands_for(ctx, DEFAULT_TEST_COMMANDS);
        self.shell
            .run_commands(&commands, ctx, &HashMap::new(), output_tx)
            .await
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ids::JobId;
    use relay_core::pipeline::StepDefinition;

    #[test]
    fn test_lint_defaults() {
        let step = StepDefinition::new("lint", ActionKind::Lint);
        let ctx = StepContext::new(JobId::new("lint"), step, "/tmp".into());
        assert_eq!(
            commands_for(&ctx, DEFAULT_LINT_COMMANDS),
            vec![
                "cargo fmt --all -- --check".to_string(),
                "cargo clippy --all-targets -- -D warnings".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_command_override() {
        let mut step = StepDefinition::new("test", ActionKind::Test);
        step.with.insert("command".into(), "true".into());
        let ctx = StepContext::new(JobId::new("test"), step, std::env::temp_dir());
        let (tx, _rx) = mpsc::channel(10);
        let result = TestAction::new().execute(&ctx, tx).await.unwrap();
        assert!(result.success);
    }
}
