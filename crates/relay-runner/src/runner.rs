//! Core runner trait and types.

use async_trait::async_trait;
use relay_cache::CacheStore;
use relay_core::Result;
use relay_core::ids::JobId;
use relay_core::pipeline::{ActionKind, StepDefinition};
use relay_core::run::Outputs;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output line from step execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of step execution.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
    pub outputs: Outputs,
}

impl StepResult {
    pub fn success(outputs: Outputs) -> Self {
        Self {
            exit_code: 0,
            success: true,
            duration_ms: 0,
            outputs,
        }
    }

    pub fn failure(exit_code: i32) -> Self {
        Self {
            exit_code,
            success: false,
            duration_ms: 0,
            outputs: Outputs::new(),
        }
    }
}

/// Context for step execution.
#[derive(Clone)]
pub struct StepContext {
    pub job_id: JobId,
    pub step: StepDefinition,
    pub workspace: PathBuf,
    /// Ref and commit of the triggering event.
    pub git_ref: String,
    pub sha: Option<String>,
    /// Default toolchain name, also part of cache keys.
    pub toolchain: String,
    /// Plain environment variables.
    pub variables: HashMap<String, String>,
    /// Credentials this step may see, keyed by environment variable name.
    pub secrets: HashMap<String, String>,
    pub cache: Option<Arc<dyn CacheStore>>,
}

impl StepContext {
    pub fn new(job_id: JobId, step: StepDefinition, workspace: PathBuf) -> Self {
        Self {
            job_id,
            step,
            workspace,
            git_ref: String::new(),
            sha: None,
            toolchain: "stable".to_string(),
            variables: HashMap::new(),
            secrets: HashMap::new(),
            cache: None,
        }
    }
}

/// Trait for step execution.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute a step, streaming output to the provided channel.
    ///
    /// `Ok` with `success == false` is a clean failure (non-zero exit);
    /// `Err` is a failure to run or a broken action contract.
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult>;

    /// The action kind this runner implements.
    fn kind(&self) -> ActionKind;
}
