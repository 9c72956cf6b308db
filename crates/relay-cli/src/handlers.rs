//! Command handlers.

use crate::commands::{EventArg, RunArgs};
use crate::config::{CliConfig, OutputFormat, ProjectConfig};
use crate::listen::Listener;
use console::style;
use relay_cache::CacheStore;
use relay_core::pipeline::PipelineFile;
use relay_core::run::RunStatus;
use relay_core::trigger::RawEvent;
use relay_runner::ActionRegistry;
use relay_scheduler::{Dispatcher, ExecutorConfig, PipelineCatalog, PipelineExecutor};
use relay_secrets::CredentialBroker;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_CANCELLED: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;

pub(crate) type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const PROJECT_TEMPLATE: &str = r#"policy:
  canonical_repository: owner/name
  main_branch: main
  read_credentials: []
  publish_credentials: [registry_token]
pipelines_dir: pipelines
workspace: .
# Run steps in this checkout; `isolated` gives each job a fresh directory.
workspace_mode: in_place
secrets:
  provider: env
  prefix: RELAY_SECRET
"#;

const PIPELINE_TEMPLATE: &str = r#"name: ci
on:
  - kind: push_any_branch
  - kind: pull_request
jobs:
  - id: lint
    cache:
      paths: [target]
    steps:
      - { id: toolchain, uses: toolchain, with: { components: [rustfmt, clippy] } }
      - { id: lint, uses: lint }
  - id: test
    steps:
      - { id: toolchain, uses: toolchain }
      - { id: test, uses: test }
"#;

/// Create a project file and a starter pipeline.
pub async fn init() -> HandlerResult {
    let project = Path::new("relay.yaml");
    if project.exists() {
        println!("{} relay.yaml already exists", style("!").yellow());
        return Ok(());
    }

    std::fs::write(project, PROJECT_TEMPLATE)?;
    println!("{} Created relay.yaml", style("✓").green());

    let pipeline = Path::new("pipelines/ci.yaml");
    if !pipeline.exists() {
        std::fs::create_dir_all("pipelines")?;
        std::fs::write(pipeline, PIPELINE_TEMPLATE)?;
        println!("{} Created pipelines/ci.yaml", style("✓").green());
    }
    Ok(())
}

fn load_catalog(project: &ProjectConfig) -> relay_core::Result<PipelineCatalog> {
    PipelineCatalog::load_dir(&project.pipelines_dir)
}

/// Load and validate every pipeline.
pub async fn validate(project_path: &Path) -> HandlerResult {
    let project = ProjectConfig::load(project_path)?;
    let catalog = match load_catalog(&project) {
        Ok(catalog) => catalog,
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            return Err(e.into());
        }
    };

    for pipeline in catalog.pipelines() {
        let definition = &pipeline.definition;
        println!(
            "{} Pipeline \"{}\" is valid",
            style("✓").green(),
            definition.name
        );
        println!(
            "  Jobs: {}  Waves: {}",
            definition.jobs.len(),
            pipeline.graph.waves().len()
        );
        if !definition.requires.is_empty() {
            let requires: Vec<&str> = definition.requires.iter().map(|p| p.as_str()).collect();
            println!("  Requires: {}", requires.join(", "));
        }
    }
    if catalog.is_empty() {
        println!(
            "{} No pipelines in {}",
            style("i").blue(),
            project.pipelines_dir.display()
        );
    }
    Ok(())
}

/// Print job waves per pipeline and the pipeline requirement levels.
pub async fn graph(project_path: &Path, only: Option<&str>) -> HandlerResult {
    let project = ProjectConfig::load(project_path)?;
    let catalog = load_catalog(&project)?;

    for pipeline in catalog.pipelines() {
        let name = pipeline.name();
        if only.is_some_and(|o| o != name.as_str()) {
            continue;
        }
        println!("{}", style(name).bold());
        for (index, wave) in pipeline.graph.waves().iter().enumerate() {
            let jobs: Vec<String> = wave
                .iter()
                .map(|job| {
                    let deps = pipeline.graph.dependencies(job.as_str());
                    if deps.is_empty() {
                        job.to_string()
                    } else {
                        let deps: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
                        format!("{} <- {}", job, deps.join(","))
                    }
                })
                .collect();
            println!("  wave {}: {}", index, jobs.join("  "));
        }
    }

    if only.is_none() && catalog.len() > 1 {
        println!("{}", style("pipelines").bold());
        for (index, level) in catalog.requirement_levels().iter().enumerate() {
            let names: Vec<&str> = level.iter().map(|p| p.as_str()).collect();
            println!("  level {}: {}", index, names.join("  "));
        }
    }
    Ok(())
}

/// Load the project file and its pipelines. `None` means a configuration
/// error was already printed.
pub(crate) fn load_project(
    project_path: &Path,
) -> HandlerResult<Option<(ProjectConfig, PipelineCatalog)>> {
    let project = match ProjectConfig::load(project_path) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e);
            return Ok(None);
        }
    };
    match load_catalog(&project) {
        Ok(catalog) => Ok(Some((project, catalog))),
        Err(e) if e.is_config() => {
            eprintln!("{} {}", style("✗").red(), e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn build_dispatcher(
    project: &ProjectConfig,
    catalog: PipelineCatalog,
) -> HandlerResult<Arc<Dispatcher>> {
    let broker = CredentialBroker::new(project.secret_provider().await?);
    let mut config = ExecutorConfig::new(&project.workspace);
    config.workspace_mode = project.workspace_mode;
    config.toolchain = project.toolchain.clone();
    config.max_parallel_jobs = project.max_parallel_jobs;
    config.variables = project.variables.clone();

    let executor = PipelineExecutor::new(ActionRegistry::builtin(), broker, config)
        .with_cache(Arc::new(project.cache_store()));
    Ok(Arc::new(Dispatcher::new(
        Arc::new(catalog),
        project.policy.clone(),
        executor,
    )))
}

/// Dispatch one event and run what it triggers. Returns the exit code.
pub async fn run(project_path: &Path, args: RunArgs, format: OutputFormat) -> HandlerResult<i32> {
    let Some((project, catalog)) = load_project(project_path)? else {
        return Ok(EXIT_CONFIG);
    };
    let dispatcher = build_dispatcher(&project, catalog).await?;

    let git_ref = args.resolved_ref(&project.policy.main_branch);
    let repository = args
        .repository
        .clone()
        .unwrap_or_else(|| project.policy.canonical_repository.clone());
    let mut raw = match args.event {
        EventArg::Push => RawEvent::push(git_ref, repository),
        EventArg::PullRequest => RawEvent::pull_request(git_ref, repository),
    }
    .with_actor(args.actor.clone());
    if let Some(sha) = &args.sha {
        raw = raw.with_sha(sha.clone());
    }

    let interrupt = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                dispatcher.cancel_all("interrupted").await;
            }
        })
    };
    let outcome = dispatcher.dispatch(raw).await;
    interrupt.abort();

    let report = outcome.report();
    report.log();

    if report.pipelines.is_empty() {
        println!(
            "{} No pipelines triggered by {} on {}",
            style("i").blue(),
            report.event_kind,
            report.git_ref
        );
    } else {
        match format {
            OutputFormat::Json => println!("{}", report.to_json()?),
            OutputFormat::Table => print!("{}", report.render_table()),
        }
    }

    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!(path = %path.display(), "Report written");
    }

    Ok(exit_code(report.status))
}

/// Serve newline-delimited JSON events from stdin until it closes, writing
/// one JSON report per finished dispatch to stdout. Returns the exit code:
/// failure if any dispatch failed.
pub async fn listen(project_path: &Path) -> HandlerResult<i32> {
    let Some((project, catalog)) = load_project(project_path)? else {
        return Ok(EXIT_CONFIG);
    };
    let dispatcher = build_dispatcher(&project, catalog).await?;
    let listener = Listener::new(dispatcher, project.policy.canonical_repository.clone());

    info!(pipelines_dir = %project.pipelines_dir.display(), "Listening for events on stdin");
    let reports = listener
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    info!(dispatches = reports.len(), "Listener stopped");
    if reports.iter().any(|r| r.status == RunStatus::Failed) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

pub fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Succeeded => EXIT_SUCCESS,
        RunStatus::Cancelled => EXIT_CANCELLED,
        RunStatus::Failed | RunStatus::Running => EXIT_FAILED,
    }
}

/// List cache entries.
pub async fn list_cache(project_path: &Path, prefix: &str) -> HandlerResult {
    let project = ProjectConfig::load(project_path)?;
    let store = project.cache_store();
    let entries = store.list(prefix).await?;

    if entries.is_empty() {
        println!("{} No cache entries", style("i").blue());
        return Ok(());
    }

    println!("Cache: {}", store.root_dir().display());
    for entry in entries {
        println!(
            "  {}  {:>10}  {}",
            entry.key,
            format_bytes(entry.size_bytes),
            entry.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Clear cache entries, all or by prefix.
pub async fn clear_cache(project_path: &Path, prefix: Option<String>) -> HandlerResult {
    let project = ProjectConfig::load(project_path)?;
    let store = project.cache_store();
    let prefix = prefix.unwrap_or_default();

    let entries = store.list(&prefix).await?;
    for entry in &entries {
        store.delete(&entry.key).await?;
    }

    if prefix.is_empty() {
        println!("{} Cache cleared ({} entries)", style("✓").green(), entries.len());
    } else {
        println!(
            "{} Cleared {} entries with prefix {}",
            style("✓").green(),
            entries.len(),
            style(&prefix).bold()
        );
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Print the pipeline file JSON schema.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(PipelineFile);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig, project_path: &Path) -> HandlerResult {
    println!("Current configuration:");
    println!(
        "  project: {}",
        config
            .project
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  output_format: {:?}", config.output_format);
    println!("  effective project: {}", project_path.display());

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
