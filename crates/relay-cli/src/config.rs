//! CLI preferences and the project file.

use relay_cache::FilesystemCacheStore;
use relay_scheduler::{TriggerPolicy, WorkspaceMode};
use relay_secrets::{EnvProvider, FileProvider, SecretProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-user CLI preferences, stored under the platform config directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Project file used when `--project` is not given.
    pub project: Option<PathBuf>,
    /// Report format for `relay run`.
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "relay", "relay")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "project" => self.project = Some(PathBuf::from(value)),
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

/// `relay.yaml`: how this repository runs its pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub policy: TriggerPolicy,
    /// Directory of pipeline YAML files.
    #[serde(default = "default_pipelines_dir")]
    pub pipelines_dir: PathBuf,
    /// Workspace root. Isolated jobs get a directory below it; in-place jobs
    /// run in it, usually the repository root.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default)]
    pub workspace_mode: WorkspaceMode,
    /// Cache directory; the platform cache directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_toolchain")]
    pub toolchain: String,
    #[serde(default)]
    pub max_parallel_jobs: Option<usize>,
    /// Plain environment variables for every step.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Where credentials come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "provider")]
pub enum SecretsConfig {
    /// `<PREFIX>_<NAME>` environment variables.
    Env {
        #[serde(default = "default_secret_prefix")]
        prefix: String,
    },
    /// A JSON object file of name to value.
    File { path: PathBuf },
}

impl Default for SecretsConfig {
    fn default() -> Self {
        SecretsConfig::Env {
            prefix: default_secret_prefix(),
        }
    }
}

fn default_pipelines_dir() -> PathBuf {
    PathBuf::from("pipelines")
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_toolchain() -> String {
    "stable".to_string()
}

fn default_secret_prefix() -> String {
    "RELAY_SECRET".to_string()
}

impl ProjectConfig {
    /// Parse a project file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .map_err(|e| format!("Invalid project file {}: {}", path.display(), e))?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.pipelines_dir = resolve(&self.pipelines_dir);
        self.workspace = resolve(&self.workspace);
        self.cache_dir = self.cache_dir.as_deref().map(resolve);
        if let SecretsConfig::File { path } = &mut self.secrets {
            *path = resolve(path.as_path());
        }
    }

    pub fn cache_store(&self) -> FilesystemCacheStore {
        match &self.cache_dir {
            Some(dir) => FilesystemCacheStore::new(dir.clone()),
            None => FilesystemCacheStore::default(),
        }
    }

    pub async fn secret_provider(&self) -> relay_core::Result<Arc<dyn SecretProvider>> {
        let provider: Arc<dyn SecretProvider> = match &self.secrets {
            SecretsConfig::Env { prefix } => Arc::new(EnvProvider::new(Some(prefix.clone()))),
            SecretsConfig::File { path } => Arc::new(FileProvider::load_from_file(path).await?),
        };
        Ok(provider)
    }
}
