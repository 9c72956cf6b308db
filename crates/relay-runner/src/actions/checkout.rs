//! Source checkout via git.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use crate::shell::{ShellRunner, shell_quote};
use async_trait::async_trait;
use relay_core::Result;
use relay_core::pipeline::ActionKind;
use relay_core::run::OutputValue;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

/// Fetches and checks out the requested ref in the workspace.
///
/// Parameters: `ref` (defaults to the event sha, then the event ref) and
/// `repository` (cloned first when the workspace is not yet a git repo).
#[derive(Default)]
pub struct CheckoutAction {
    shell: ShellRunner,
}

impl CheckoutAction {
    pub fn new() -> Self {
        Self::default()
    }

    fn commands(ctx: &StepContext) -> Vec<String> {
        let target = ctx
            .step
            .param_str("ref")
            .map(str::to_string)
            .or_else(|| ctx.sha.clone())
            .unwrap_or_else(|| ctx.git_ref.clone());

        let mut commands = Vec::new();
        if let Some(repository) = ctx.step.param_str("repository")
            && !ctx.workspace.join(".git").exists()
        {
            commands.push(format!("git clone --no-checkout {} .", shell_quote(repository)));
        }
        if !target.is_empty() {
            commands.push(format!("git fetch --depth=1 origin {}", shell_quote(&target)));
            commands.push("git checkout --force FETCH_HEAD".to_string());
        }
        commands
    }
}

#[async_trait]
impl StepRunner for CheckoutAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let commands = Self::commands(ctx);
        info!(job = %ctx.job_id, git_ref = %ctx.git_ref, "Checking out sources");
        let mut result = self
            .shell
            .run_commands(&commands, ctx, &HashMap::new(), output_tx)
            .await?;
        if result.success {
            result
                .outputs
                .insert("ref".to_string(), OutputValue::Text(ctx.git_ref.clone()));
        }
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Checkout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ids::JobId;
    use relay_core::pipeline::StepDefinition;

    #[test]
    fn test_checkout_prefers_explicit_ref() {
        let mut step = StepDefinition::new("checkout", ActionKind::Checkout);
        step.with.insert("ref".into(), "v1.0.0".into());
        step.with
            .insert("repository".into(), "https://example.com/acme/widget.git".into());
        let mut ctx = StepContext::new(JobId::new("lint"), step, "/nonexistent/ws".into());
        ctx.git_ref = "refs/heads/main".into();

        let commands = CheckoutAction::commands(&ctx);
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("git clone"));
        assert_eq!(commands[1], "git fetch --depth=1 origin 'v1.0.0'");
    }

    #[test]
    fn test_checkout_defaults_to_event_sha() {
        let step = StepDefinition::new("checkout", ActionKind::Checkout);
        let mut ctx = StepContext::new(JobId::new("lint"), step, "/nonexistent/ws".into());
        ctx.git_ref = "refs/heads/dev".into();
        ctx.sha = Some("abc123".into());

        let commands = CheckoutAction::commands(&ctx);
        assert_eq!(commands[0], "git fetch --depth=1 origin 'abc123'");
    }
}
