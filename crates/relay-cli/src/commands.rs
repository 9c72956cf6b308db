//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Create relay.yaml and a starter pipeline
    Init,

    /// Validate every pipeline definition
    Validate,

    /// Print job waves and pipeline requirement levels
    Graph {
        /// Only this pipeline
        pipeline: Option<String>,
    },

    /// Dispatch an event and run the pipelines it triggers
    Run(RunArgs),

    /// Read JSON events from stdin, one per line, and keep dispatching
    /// until stdin closes
    Listen,

    /// Manage the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Print the JSON schema for pipeline files
    Schema,

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Event kind to simulate
    #[arg(short, long, value_enum, default_value_t = EventArg::Push)]
    pub event: EventArg,

    /// Branch to build; shorthand for --ref refs/heads/<branch>
    #[arg(short, long, conflicts_with = "git_ref")]
    pub branch: Option<String>,

    /// Full git ref, e.g. refs/pull/12/merge
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Repository the event comes from (default: the canonical repository)
    #[arg(short, long, env = "RELAY_REPOSITORY")]
    pub repository: Option<String>,

    /// Commit sha
    #[arg(long, env = "RELAY_SHA")]
    pub sha: Option<String>,

    /// Actor that caused the event
    #[arg(long, env = "RELAY_ACTOR", default_value = "local")]
    pub actor: String,

    /// Write the JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RunArgs {
    /// The ref to build, defaulting to the main branch.
    pub fn resolved_ref(&self, main_branch: &str) -> String {
        match (&self.git_ref, &self.branch) {
            (Some(git_ref), _) => git_ref.clone(),
            (None, Some(branch)) => format!("refs/heads/{}", branch),
            (None, None) => format!("refs/heads/{}", main_branch),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventArg {
    Push,
    PullRequest,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cache entries
    List {
        /// Cache key prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Clear cache
    Clear {
        /// Cache key prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(branch: Option<&str>, git_ref: Option<&str>) -> RunArgs {
        RunArgs {
            event: EventArg::Push,
            branch: branch.map(String::from),
            git_ref: git_ref.map(String::from),
            repository: None,
            sha: None,
            actor: "local".to_string(),
            report: None,
        }
    }

    #[test]
    fn test_resolved_ref() {
        assert_eq!(args(None, None).resolved_ref("main"), "refs/heads/main");
        assert_eq!(
            args(Some("feature/x"), None).resolved_ref("main"),
            "refs/heads/feature/x"
        );
        assert_eq!(
            args(None, Some("refs/pull/7/merge")).resolved_ref("main"),
            "refs/pull/7/merge"
        );
    }
}
