//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.
//! Definitions are loaded once at process start and never mutated.

use crate::condition::Condition;
use crate::ids::{CredentialName, JobId, PipelineId, StepId};
use crate::trigger::EventKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub name: PipelineId,
    #[serde(default)]
    pub description: Option<String>,
    /// Event kinds that select this pipeline.
    #[serde(default)]
    pub on: Vec<TriggerConfig>,
    /// Pipelines that must succeed on the same event before this one may run.
    #[serde(default)]
    pub requires: Vec<PipelineId>,
    pub jobs: Vec<JobDefinition>,
}

impl PipelineDefinition {
    pub fn job(&self, id: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.id.as_str() == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    pub kind: EventKind,
    /// Branch globs; empty means every branch.
    #[serde(default)]
    pub branches: Vec<String>,
}

impl TriggerConfig {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            branches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub id: JobId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub needs: Vec<JobId>,
    #[serde(default, rename = "if")]
    pub condition: Option<Condition>,
    pub steps: Vec<StepDefinition>,
    /// Credentials this job may receive.
    #[serde(default)]
    pub permissions: Vec<CredentialName>,
    /// Output names exported to downstream jobs.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub cache: Option<JobCache>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl JobDefinition {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn declares_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }
}

/// Dependency cache wrapped around a job's steps.
///
/// Expanded at load time into a leading `cache_restore` step and a trailing
/// `cache_save` step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCache {
    pub paths: Vec<String>,
    /// Files whose contents determine the cache key, e.g. `Cargo.lock`.
    #[serde(default = "default_lock_files")]
    pub lock_files: Vec<String>,
    /// Key partition; defaults to the job id.
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
}

fn default_lock_files() -> Vec<String> {
    vec!["Cargo.lock".to_string()]
}

fn default_cache_prefix() -> String {
    "v0-rust".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub id: StepId,
    #[serde(default)]
    pub name: Option<String>,
    pub uses: ActionKind,
    /// Action parameters.
    #[serde(default)]
    pub with: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "if")]
    pub condition: Option<Condition>,
    /// Credentials injected into this step's environment.
    #[serde(default)]
    pub credentials: Vec<CredentialName>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default = "default_step_timeout")]
    pub timeout_minutes: u32,
}

fn default_step_timeout() -> u32 {
    30
}

/// Credential a `publish` step uses when it names none.
pub const DEFAULT_PUBLISH_CREDENTIAL: &str = "registry_token";

impl StepDefinition {
    pub fn new(id: impl Into<StepId>, uses: ActionKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            uses,
            with: BTreeMap::new(),
            condition: None,
            credentials: Vec::new(),
            outputs: Vec::new(),
            timeout_minutes: default_step_timeout(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// String parameter lookup.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.with.get(key).and_then(|v| v.as_str())
    }

    /// Credential the step's action reads from its environment, if any.
    pub fn required_credential(&self) -> Option<&str> {
        match self.uses {
            ActionKind::Publish => Some(
                self.param_str("credential")
                    .unwrap_or(DEFAULT_PUBLISH_CREDENTIAL),
            ),
            _ => None,
        }
    }

    /// String-list parameter lookup; a single string is a one-item list.
    pub fn param_list(&self, key: &str) -> Vec<String> {
        match self.with.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// The external collaborator a step invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Checkout,
    Toolchain,
    CacheRestore,
    CacheSave,
    Lint,
    Test,
    Release,
    Publish,
    Run,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Checkout => "checkout",
            ActionKind::Toolchain => "toolchain",
            ActionKind::CacheRestore => "cache_restore",
            ActionKind::CacheSave => "cache_save",
            ActionKind::Lint => "lint",
            ActionKind::Test => "test",
            ActionKind::Release => "release",
            ActionKind::Publish => "publish",
            ActionKind::Run => "run",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of pipeline definitions as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PipelineFile {
    #[serde(default)]
    pub pipelines: Vec<PipelineDefinition>,
}
