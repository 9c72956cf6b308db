//! Relay CI CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod listen;

#[cfg(test)]
mod listen_tests;

use commands::{CacheCommands, Commands, ConfigCommands};
use config::{CliConfig, OutputFormat};

#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about = "Relay CI pipeline orchestrator", long_about = None)]
struct Cli {
    /// Project file (default: relay.yaml, or the configured project)
    #[arg(short, long, global = true, env = "RELAY_PROJECT")]
    project: Option<PathBuf>,

    /// JSON logs and JSON run report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let config = CliConfig::load().unwrap_or_default();
    let project = cli
        .project
        .or_else(|| config.project.clone())
        .unwrap_or_else(|| PathBuf::from("relay.yaml"));
    let format = if cli.json {
        OutputFormat::Json
    } else {
        config.output_format
    };

    match cli.command {
        Commands::Init => handlers::init().await?,
        Commands::Validate => handlers::validate(&project).await?,
        Commands::Graph { pipeline } => handlers::graph(&project, pipeline.as_deref()).await?,
        Commands::Run(args) => {
            let code = handlers::run(&project, args, format).await?;
            if code != handlers::EXIT_SUCCESS {
                std::process::exit(code);
            }
        }
        Commands::Listen => {
            let code = handlers::listen(&project).await?;
            if code != handlers::EXIT_SUCCESS {
                std::process::exit(code);
            }
        }
        Commands::Cache { command } => match command {
            CacheCommands::List { prefix } => handlers::list_cache(&project, &prefix).await?,
            CacheCommands::Clear { prefix } => handlers::clear_cache(&project, prefix).await?,
        },
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config, &project)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
