//! Release computation.
//!
//! The versioning logic itself lives in an external tool configured through
//! `command`. That tool must report, via `$RELAY_OUTPUT`, whether a release
//! was created and, if so, its tag and version.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use crate::shell::ShellRunner;
use async_trait::async_trait;
use relay_core::pipeline::ActionKind;
use relay_core::run::{OutputValue, Outputs};
use relay_core::{Error, Result};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Default)]
pub struct ReleaseAction {
    shell: ShellRunner,
}

impl ReleaseAction {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Check the release output contract.
pub fn validate_release_outputs(step: &str, outputs: &Outputs) -> Result<bool> {
    let created = match outputs.get("release_created") {
        Some(OutputValue::Bool(created)) => *created,
        Some(other) => {
            return Err(Error::InvalidInput(format!(
                "step '{}' reported non-boolean release_created '{}'",
                step, other
            )));
        }
        None => {
            return Err(Error::InvalidInput(format!(
                "step '{}' did not report release_created",
                step
            )));
        }
    };

    if created {
        for required in ["tag_name", "version"] {
            if !outputs.contains_key(required) {
                return Err(Error::InvalidInput(format!(
                    "step '{}' created a release without reporting {}",
                    step, required
                )));
            }
        }
    }
    Ok(created)
}

#[async_trait]
impl StepRunner for ReleaseAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let commands = ctx.step.param_list("command");
        if commands.is_empty() {
            return Err(Error::InvalidInput(format!(
                "step '{}' has no release 'command'",
                ctx.step.id
            )));
        }

        let result = self
            .shell
            .run_commands(&commands, ctx, &HashMap::new(), output_tx)
            .await?;
        if !result.success {
            return Ok(result);
        }

        let created = validate_release_outputs(ctx.step.id.as_str(), &result.outputs)?;
        info!(
            job = %ctx.job_id,
            release_created = created,
            tag_name = ?result.outputs.get("tag_name").map(ToString::to_string),
            "Release computed"
        );
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Release
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ids::JobId;
    use relay_core::pipeline::StepDefinition;

    fn outputs(pairs: &[(&str, OutputValue)]) -> Outputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_release_contract() {
        let declined = outputs(&[("release_created", false.into())]);
        assert!(!validate_release_outputs("r", &declined).unwrap());
        assert!(
            validate_release_outputs(
                "r",
                &outputs(&[
                    ("release_created", true.into()),
                    ("tag_name", "v1.2.0".into()),
                    ("version", "1.2.0".into()),
                ])
            )
            .unwrap()
        );
        let untagged = outputs(&[("release_created", true.into())]);
        assert!(validate_release_outputs("r", &untagged).is_err());
        let unclear = outputs(&[("release_created", "maybe".into())]);
        assert!(validate_release_outputs("r", &unclear).is_err());
        assert!(validate_release_outputs("r", &Outputs::new()).is_err());
    }

    #[tokio::test]
    async fn test_release_command_reports_outputs() {
        let mut step = StepDefinition::new("compute", ActionKind::Release);
        let command =
            r#"printf 'release_created=true\ntag_name=v0.3.0\nversion=0.3.0\n' >> "$RELAY_OUTPUT""#;
        step.with.insert("command".into(), command.into());
        let ctx = StepContext::new(JobId::new("release"), step, std::env::temp_dir());
        let (tx, _rx) = mpsc::channel(10);

        let result = ReleaseAction::new().execute(&ctx, tx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.outputs.get("release_created"), Some(&OutputValue::Bool(true)));
        assert_eq!(result.outputs.get("tag_name"), Some(&OutputValue::Text("v0.3.0".into())));
    }
}
