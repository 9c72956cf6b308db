//! Shell-based step execution on the host.
//!
//! Commands run under `sh -c` in the job workspace. Steps report outputs by
//! appending `key=value` lines to the file named by `$RELAY_OUTPUT`.

use crate::runner::{OutputLine, OutputStream, StepContext, StepResult, StepRunner};
use async_trait::async_trait;
use relay_core::pipeline::ActionKind;
use relay_core::run::{OutputValue, Outputs};
use relay_core::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Environment variable naming the step output file.
pub const OUTPUT_ENV: &str = "RELAY_OUTPUT";

/// Parse `key=value` output lines. Later lines win.
pub fn parse_outputs(content: &str) -> Outputs {
    let mut outputs = Outputs::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                outputs.insert(key.to_string(), OutputValue::parse(value));
            }
        }
    }
    outputs
}

/// Quote a value for safe interpolation into a `sh -c` script.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell runner for executing commands on the host.
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Run one command, streaming its output and collecting `$RELAY_OUTPUT`.
    ///
    /// The command runs in its own process group. The whole group is killed
    /// when the command exits or when the returned future is dropped, so
    /// nothing it started outlives the step.
    pub async fn run_command(
        &self,
        command_line: &str,
        ctx: &StepContext,
        extra_env: &HashMap<String, String>,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let start = std::time::Instant::now();
        let output_file = tempfile::Builder::new()
            .prefix("relay-output-")
            .tempfile()
            .map_err(|e| Error::Internal(format!("Failed to create output file: {}", e)))?;

        info!(
            job = %ctx.job_id,
            step = %ctx.step.id,
            command = %command_line,
            workspace = %ctx.workspace.display(),
            "Executing shell command"
        );

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(command_line)
            .current_dir(&ctx.workspace)
            .envs(&ctx.variables)
            .envs(&ctx.secrets)
            .envs(extra_env)
            .env(OUTPUT_ENV, output_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn process: {}", e)))?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Process stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("Process stderr not captured".to_string()))?;

        group.forwarders.push(tokio::spawn(forward_lines(
            stdout,
            OutputStream::Stdout,
            output_tx.clone(),
        )));
        group.forwarders.push(tokio::spawn(forward_lines(
            stderr,
            OutputStream::Stderr,
            output_tx,
        )));

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Internal(format!("Failed to wait for process: {}", e)))?;

        // Background processes the command left behind hold the pipes open.
        group.kill();
        for handle in group.forwarders.drain(..) {
            let _ = handle.await;
        }

        let content = tokio::fs::read_to_string(output_file.path())
            .await
            .unwrap_or_default();
        let outputs = parse_outputs(&content);

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(exit_code, duration_ms, outputs = outputs.len(), "Command completed");

        Ok(StepResult {
            exit_code,
            success: exit_code == 0,
            duration_ms,
            outputs,
        })
    }

    /// Run commands in order, stopping at the first failure. Outputs merge.
    pub async fn run_commands(
        &self,
        commands: &[String],
        ctx: &StepContext,
        extra_env: &HashMap<String, String>,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let mut combined = StepResult::success(Outputs::new());
        for command in commands {
            let result = self
                .run_command(command, ctx, extra_env, output_tx.clone())
                .await?;
            combined.duration_ms += result.duration_ms;
            combined.exit_code = result.exit_code;
            combined.success = result.success;
            combined.outputs.extend(result.outputs);
            if !result.success {
                break;
            }
        }
        Ok(combined)
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

/// Process group of one running command plus its output forwarders.
struct ProcessGroup {
    leader: Option<u32>,
    forwarders: Vec<JoinHandle<()>>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self {
            leader,
            forwarders: Vec::new(),
        }
    }

    /// SIGKILL every process still in the group. Idempotent.
    fn kill(&mut self) {
        let Some(leader) = self.leader.take() else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: kill(2) takes plain integers and touches no memory.
            let rc = unsafe { libc::kill(-(leader as libc::pid_t), libc::SIGKILL) };
            if rc == 0 {
                debug!(pgid = leader, "Killed step process group");
            }
        }
        #[cfg(not(unix))]
        let _ = leader;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
        for handle in &self.forwarders {
            handle.abort();
        }
    }
}

async fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_num = 0u32;

    while let Ok(Some(line)) = lines.next_line().await {
        line_num += 1;
        let output = OutputLine {
            stream,
            content: line,
            line_number: line_num,
            timestamp: chrono::Utc::now(),
        };
        if tx.send(output).await.is_err() {
            break;
        }
    }
}

/// The generic `run` action: `with.command` is one command or a list.
#[async_trait]
impl StepRunner for ShellRunner {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let commands = ctx.step.param_list("command");
        if commands.is_empty() {
            return Err(Error::InvalidInput(format!(
                "step '{}' has no 'command' to run",
                ctx.step.id
            )));
        }
        self.run_commands(&commands, ctx, &HashMap::new(), output_tx)
            .await
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ids::JobId;
    use relay_core::pipeline::StepDefinition;
    use std::time::Duration;

    fn make_ctx(cmd: serde_json::Value) -> StepContext {
        let mut step = StepDefinition::new("script", ActionKind::Run);
        step.with.insert("command".into(), cmd);
        StepContext::new(JobId::new("build"), step, std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_shell_runner_success() {
        let runner = ShellRunner::default();
        let (tx, mut rx) = mpsc::channel(100);

        let ctx = make_ctx("echo hello".into());
        let result = runner.execute(&ctx, tx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);

        let line = rx.recv().await.unwrap();
        assert_eq!(line.content, "hello");
        assert_eq!(line.stream, OutputStream::Stdout);
    }

    #[tokio::test]
    async fn test_shell_runner_failure_stops_sequence() {
        let runner = ShellRunner::default();
        let (tx, mut rx) = mpsc::channel(100);

        let ctx = make_ctx(serde_json::json!(["exit 3", "echo unreachable"]));
        let result = runner.execute(&ctx, tx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_outputs_from_output_file() {
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(100);

        let ctx = make_ctx(
            "echo release_created=true >> $RELAY_OUTPUT; echo version=1.2.0 >> $RELAY_OUTPUT"
                .into(),
        );
        let result = runner.execute(&ctx, tx).await.unwrap();
        assert_eq!(
            result.outputs.get("release_created"),
            Some(&OutputValue::Bool(true))
        );
        assert_eq!(
            result.outputs.get("version"),
            Some(&OutputValue::Text("1.2.0".into()))
        );
    }

    #[tokio::test]
    async fn test_background_process_does_not_hold_step_open() {
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(100);

        let ctx = make_ctx("sleep 30 & echo started".into());
        let result = tokio::time::timeout(Duration::from_secs(5), runner.execute(&ctx, tx))
            .await
            .expect("step waited for its background process")
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_dropped_step_kills_child_processes() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(100);

        let mut step = StepDefinition::new("slow", ActionKind::Run);
        step.with.insert("command".into(), "sleep 1; touch late".into());
        let ctx = StepContext::new(JobId::new("build"), step, workspace.path().to_path_buf());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(200), runner.execute(&ctx, tx)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!workspace.path().join("late").exists());
    }

    #[test]
    fn test_parse_outputs() {
        let outputs = parse_outputs("a=1\n\n# note\nb = text \nbad line\na=2\n");
        assert_eq!(outputs.get("a"), Some(&OutputValue::Integer(2)));
        assert_eq!(outputs.get("b"), Some(&OutputValue::Text("text".into())));
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("main"), "'main'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid_input() {
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(1);
        let step = StepDefinition::new("empty", ActionKind::Run);
        let ctx = StepContext::new(JobId::new("build"), step, std::env::temp_dir());
        let err = runner.execute(&ctx, tx).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
