//! Pipeline catalog.
//!
//! Loads pipeline definitions once at startup, expands job-level cache
//! blocks, validates every definition and orders pipelines by their
//! `requires` relation. Nothing in a loaded catalog is mutated afterwards.

use crate::dag::{JobGraph, NamedGraph};
use crate::validate::validate_pipeline;
use relay_core::condition::{Condition, StepOutputMatch};
use relay_core::error::ConfigError;
use relay_core::ids::PipelineId;
use relay_core::pipeline::{
    ActionKind, JobDefinition, PipelineDefinition, PipelineFile, StepDefinition,
};
use relay_core::run::OutputValue;
use relay_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Step id of the restore step generated from a job `cache` block.
pub const CACHE_RESTORE_STEP: &str = "cache-restore";
/// Step id of the save step generated from a job `cache` block.
pub const CACHE_SAVE_STEP: &str = "cache-save";

/// A validated pipeline and its job graph.
#[derive(Debug)]
pub struct LoadedPipeline {
    pub definition: PipelineDefinition,
    pub graph: JobGraph,
}

impl LoadedPipeline {
    /// Expand, validate and build the graph for one definition.
    pub fn load(definition: PipelineDefinition) -> std::result::Result<Self, ConfigError> {
        let definition = expand_cache_blocks(definition);
        validate_pipeline(&definition)?;
        let graph = JobGraph::build(&definition)?;
        Ok(Self { definition, graph })
    }

    pub fn name(&self) -> &PipelineId {
        &self.definition.name
    }
}

#[derive(Debug, Default)]
pub struct PipelineCatalog {
    pipelines: Vec<Arc<LoadedPipeline>>,
    index: HashMap<PipelineId, usize>,
    /// Pipelines grouped by `requires` depth.
    levels: Vec<Vec<PipelineId>>,
}

impl PipelineCatalog {
    pub fn from_definitions(
        definitions: Vec<PipelineDefinition>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut pipelines = Vec::with_capacity(definitions.len());
        let mut index = HashMap::new();
        for definition in definitions {
            if index.contains_key(&definition.name) {
                return Err(ConfigError::DuplicatePipeline(definition.name.to_string()));
            }
            let loaded = LoadedPipeline::load(definition)?;
            debug!(
                pipeline = %loaded.name(),
                jobs = loaded.graph.len(),
                waves = loaded.graph.waves().len(),
                "Pipeline loaded"
            );
            index.insert(loaded.name().clone(), pipelines.len());
            pipelines.push(Arc::new(loaded));
        }

        let mut requirements = NamedGraph::new(pipelines.iter().map(|p| p.name().as_str()));
        for pipeline in &pipelines {
            for required in &pipeline.definition.requires {
                if !requirements.contains(required.as_str()) {
                    return Err(ConfigError::UnknownPipeline {
                        pipeline: pipeline.name().to_string(),
                        required: required.to_string(),
                    });
                }
                requirements.add_dependency(pipeline.name().as_str(), required.as_str());
            }
        }

        if let Some(cycle) = requirements.find_cycle() {
            return Err(ConfigError::CycleDetected {
                scope: "pipeline requirements".to_string(),
                cycle,
            });
        }

        let levels = requirements
            .levels()
            .ok_or_else(|| {
                let reason = "pipeline requirements could not be ordered";
                ConfigError::InvalidDefinition(reason.to_string())
            })?
            .into_iter()
            .map(|level| level.into_iter().map(PipelineId::from).collect())
            .collect();

        Ok(Self {
            pipelines,
            index,
            levels,
        })
    }

    /// Load every `*.yaml`/`*.yml` file in a directory, in file name order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| {
                Error::Config(ConfigError::InvalidDefinition(format!(
                    "cannot read pipeline directory {}: {}",
                    dir.display(),
                    e
                )))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "yaml" || e == "yml")
            })
            .collect();
        files.sort();

        let mut definitions = Vec::new();
        for file in &files {
            definitions.extend(load_file(file)?);
        }

        let catalog = Self::from_definitions(definitions)?;
        info!(
            dir = %dir.display(),
            files = files.len(),
            pipelines = catalog.len(),
            "Pipeline catalog loaded"
        );
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LoadedPipeline>> {
        self.index.get(name).map(|&i| &self.pipelines[i])
    }

    pub fn pipelines(&self) -> &[Arc<LoadedPipeline>] {
        &self.pipelines
    }

    /// Definitions in load order.
    pub fn definitions(&self) -> impl Iterator<Item = &PipelineDefinition> {
        self.pipelines.iter().map(|p| &p.definition)
    }

    /// Every pipeline grouped by `requires` depth.
    pub fn requirement_levels(&self) -> &[Vec<PipelineId>] {
        &self.levels
    }

    /// The requirement levels restricted to `selected`, empty levels dropped.
    pub fn levels_for(&self, selected: &[PipelineId]) -> Vec<Vec<PipelineId>> {
        let selected: HashSet<&PipelineId> = selected.iter().collect();
        self.levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|p| selected.contains(p))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Read one file holding either a single pipeline or a `pipelines:` list.
pub fn load_file(path: &Path) -> Result<Vec<PipelineDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(ConfigError::InvalidDefinition(format!(
            "cannot read {}: {}",
            path.display(),
            e
        )))
    })?;
    parse_document(&content, &path.display().to_string()).map_err(Error::Config)
}

/// Parse pipeline YAML. `source` names the document in error messages.
pub fn parse_document(
    content: &str,
    source: &str,
) -> std::result::Result<Vec<PipelineDefinition>, ConfigError> {
    let invalid =
        |e: serde_yaml::Error| ConfigError::InvalidDefinition(format!("{}: {}", source, e));

    let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(invalid)?;
    if value.get("pipelines").is_some() {
        let file: PipelineFile = serde_yaml::from_value(value).map_err(invalid)?;
        Ok(file.pipelines)
    } else {
        let definition: PipelineDefinition = serde_yaml::from_value(value).map_err(invalid)?;
        Ok(vec![definition])
    }
}

/// Replace each job `cache` block with a restore step in front of the job's
/// steps and a save step behind them. The save step is skipped on an exact
/// cache hit.
pub fn expand_cache_blocks(mut definition: PipelineDefinition) -> PipelineDefinition {
    for job in &mut definition.jobs {
        expand_job_cache(job);
    }
    definition
}

fn expand_job_cache(job: &mut JobDefinition) {
    let Some(cache) = job.cache.take() else {
        return;
    };

    let partition = cache
        .partition
        .clone()
        .unwrap_or_else(|| job.id.to_string());
    let mut params = std::collections::BTreeMap::new();
    params.insert("paths".to_string(), serde_json::json!(cache.paths));
    params.insert("lock_files".to_string(), serde_json::json!(cache.lock_files));
    params.insert("partition".to_string(), serde_json::json!(partition));
    params.insert("prefix".to_string(), serde_json::json!(cache.prefix));

    let mut restore = StepDefinition::new(CACHE_RESTORE_STEP, ActionKind::CacheRestore);
    restore.name = Some("Restore dependency cache".to_string());
    restore.with = params.clone();
    restore.outputs = vec!["cache_hit".to_string(), "cache_key".to_string()];

    let mut save = StepDefinition::new(CACHE_SAVE_STEP, ActionKind::CacheSave);
    save.name = Some("Save dependency cache".to_string());
    save.with = params;
    save.condition = Some(Condition::Not(Box::new(Condition::StepEquals(StepOutputMatch {
        step: CACHE_RESTORE_STEP.to_string(),
        output: "cache_hit".to_string(),
        value: OutputValue::Bool(true),
    }))));

    job.steps.insert(0, restore);
    job.steps.push(save);
}
