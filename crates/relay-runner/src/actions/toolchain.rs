//! Toolchain installation via rustup.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use crate::shell::{ShellRunner, shell_quote};
use async_trait::async_trait;
use relay_core::Result;
use relay_core::pipeline::ActionKind;
use relay_core::run::OutputValue;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

/// Installs `toolchain` (default: the run's toolchain) with optional
/// `components` and `targets`, then pins it for the workspace.
#[derive(Default)]
pub struct ToolchainAction {
    shell: ShellRunner,
}

impl ToolchainAction {
    pub fn new() -> Self {
        Self::default()
    }

    fn toolchain(ctx: &StepContext) -> String {
        ctx.step
            .param_str("toolchain")
            .map(str::to_string)
            .unwrap_or_else(|| ctx.toolchain.clone())
    }

    fn commands(ctx: &StepContext) -> Vec<String> {
        let toolchain = shell_quote(&Self::toolchain(ctx));
        let profile = ctx.step.param_str("profile").unwrap_or("minimal");

        let mut install = format!(
            "rustup toolchain install {} --profile {}",
            toolchain,
            shell_quote(profile)
        );
        for component in ctx.step.param_list("components") {
            install.push_str(&format!(" -c {}", shell_quote(&component)));
        }
        for target in ctx.step.param_list("targets") {
            install.push_str(&format!(" -t {}", shell_quote(&target)));
        }

        vec![install, format!("rustup override set {}", toolchain)]
    }
}

#[async_trait]
impl StepRunner for ToolchainAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let toolchain = Self::toolchain(ctx);
        info!(job = %ctx.job_id, toolchain = %toolchain, "Installing toolchain");
        let mut result = self
            .shell
            .run_commands(&Self::commands(ctx), ctx, &HashMap::new(), output_tx)
            .await?;
        if result.success {
            result
                .outputs
                .insert("toolchain".to_string(), OutputValue::Text(toolchain));
        }
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Toolchain
    }
}
