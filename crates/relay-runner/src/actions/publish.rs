//! Registry publishing.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use crate::shell::{ShellRunner, shell_quote};
use async_trait::async_trait;
use relay_core::pipeline::{ActionKind, DEFAULT_PUBLISH_CREDENTIAL};
use relay_core::run::OutputValue;
use relay_core::{Error, Result};
use relay_secrets::env_var_name;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

/// Publishes the package with the named credential.
///
/// Parameters: `credential` (default `registry_token`), which the step must
/// list in its own `credentials`; `token_env` (default
/// `CARGO_REGISTRY_TOKEN`), the variable the token is exposed as; optional
/// `artifact` (package name) and `command`.
#[derive(Default)]
pub struct PublishAction {
    shell: ShellRunner,
}

impl PublishAction {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepRunner for PublishAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let credential = ctx
            .step
            .required_credential()
            .unwrap_or(DEFAULT_PUBLISH_CREDENTIAL);
        let token = ctx
            .secrets
            .get(&env_var_name(credential))
            .ok_or_else(|| Error::PermissionDenied {
                job: ctx.job_id.to_string(),
                credential: credential.to_string(),
            })?;

        let token_env = ctx
            .step
            .param_str("token_env")
            .unwrap_or("CARGO_REGISTRY_TOKEN");
        let env = HashMap::from([(token_env.to_string(), token.clone())]);

        let mut commands = ctx.step.param_list("command");
        if commands.is_empty() {
            commands.push(match ctx.step.param_str("artifact") {
                Some(artifact) => format!("cargo publish -p {}", shell_quote(artifact)),
                None => "cargo publish".to_string(),
            });
        }

        info!(job = %ctx.job_id, credential = %credential, "Publishing package");
        let mut result = self.shell.run_commands(&commands, ctx, &env, output_tx).await?;
        result
            .outputs
            .insert("published".to_string(), OutputValue::Bool(result.success));
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ids::JobId;
    use relay_core::pipeline::StepDefinition;

    #[tokio::test]
    async fn test_publish_requires_credential() {
        let step = StepDefinition::new("push", ActionKind::Publish);
        let ctx = StepContext::new(JobId::new("publish"), step, std::env::temp_dir());
        let (tx, _rx) = mpsc::channel(10);
        let err = PublishAction::new().execute(&ctx, tx).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_publish_exposes_token() {
        let mut step = StepDefinition::new("push", ActionKind::Publish);
        step.with.insert(
            "command".into(),
            "test \"$CARGO_REGISTRY_TOKEN\" = tok-1".into(),
        );
        let mut ctx = StepContext::new(JobId::new("publish"), step, std::env::temp_dir());
        ctx.secrets.insert("REGISTRY_TOKEN".into(), "tok-1".into());
        let (tx, _rx) = mpsc::channel(10);

        let result = PublishAction::new().execute(&ctx, tx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.outputs.get("published"), Some(&OutputValue::Bool(true)));
    }
}
