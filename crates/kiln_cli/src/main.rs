//! Kiln CLI: inspect and drive incremental artifact execution.
//!
//! `kiln plan` shows what a run would execute or reuse, `kiln run` executes a
//! graph through a user-supplied creation command, `kiln impact` lists what a
//! change would invalidate, and `kiln cache` / `kiln recovery` inspect the
//! persistent state those runs leave behind.

#![warn(missing_docs)]

mod cache;
mod impact;
mod logging;
mod pipeline;
mod plan;
mod recovery;
mod run;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Kiln: incremental execution for artifact graphs.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Incremental artifact execution")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which artifacts a run would execute and which it would reuse.
    Plan(PlanArgs),
    /// Execute a graph, creating artifacts with an external command.
    Run(RunArgs),
    /// List the artifacts a change to one artifact would invalidate.
    Impact(ImpactArgs),
    /// Inspect or clear the execution cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Inspect and manage saved recoveries of failed runs.
    Recovery {
        /// The recovery operation.
        #[command(subcommand)]
        action: RecoveryCommand,
    },
}

/// Arguments for `kiln plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Artifact graph file (`{"artifacts": [...]}`).
    pub graph: PathBuf,

    /// Artifact ids to run regardless of the cache.
    #[arg(long = "force", value_name = "ID")]
    pub force: Vec<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `kiln run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Artifact graph file (`{"artifacts": [...]}`).
    pub graph: PathBuf,

    /// Shell command that creates one artifact. Receives the artifact spec as
    /// JSON on stdin and `KILN_ARTIFACT_ID` in its environment; its stdout is
    /// the artifact content.
    #[arg(long = "exec", value_name = "CMD")]
    pub exec: String,

    /// Artifact ids to run regardless of the cache.
    #[arg(long = "force", value_name = "ID")]
    pub force: Vec<String>,

    /// Goal text used to key the recovery of a failed run. Defaults to the
    /// graph file name.
    #[arg(long)]
    pub goal: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `kiln impact`.
#[derive(Parser, Debug)]
pub struct ImpactArgs {
    /// Artifact graph file.
    pub graph: PathBuf,

    /// The artifact that would change.
    pub artifact: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// `kiln cache` operations.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Aggregate statistics.
    Stats {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// One artifact's cache entry.
    Show {
        /// Artifact id.
        artifact: String,
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// All cache entries, most recent first.
    List {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Remove one entry, or every entry when no id is given.
    Clear {
        /// Artifact id.
        artifact: Option<String>,
    },
}

/// `kiln recovery` operations.
#[derive(Subcommand, Debug)]
pub enum RecoveryCommand {
    /// Pending recoveries, newest first.
    List {
        /// List archived recoveries instead.
        #[arg(long)]
        archived: bool,
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// One recovery, by goal hash or unique prefix.
    Show {
        /// Goal hash or prefix.
        id: String,
        /// Print the repair briefing instead of the status table.
        #[arg(long)]
        context: bool,
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Archive a recovery.
    Resolve {
        /// Goal hash or prefix.
        id: String,
    },
    /// Delete a recovery.
    Delete {
        /// Goal hash or prefix.
        id: String,
    },
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Plan(ref args) => plan::run(args, &global),
        Command::Run(ref args) => run::run(args, &global),
        Command::Impact(ref args) => impact::run(args, &global),
        Command::Cache { ref action } => cache::run(action, &global),
        Command::Recovery { ref action } => recovery::run(action, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_plan_defaults() {
        let cli = Cli::parse_from(["kiln", "plan", "graph.json"]);
        match cli.command {
            Command::Plan(args) => {
                assert_eq!(args.graph, PathBuf::from("graph.json"));
                assert!(args.force.is_empty());
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn parse_plan_repeated_force() {
        let cli = Cli::parse_from([
            "kiln", "plan", "graph.json", "--force", "A", "--force", "B", "-f", "json",
        ]);
        match cli.command {
            Command::Plan(args) => {
                assert_eq!(args.force, vec!["A", "B"]);
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from([
            "kiln",
            "run",
            "graph.json",
            "--exec",
            "./generate.sh --model small",
            "--goal",
            "Build an API",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.exec, "./generate.sh --model small");
                assert_eq!(args.goal.as_deref(), Some("Build an API"));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_requires_exec() {
        assert!(Cli::try_parse_from(["kiln", "run", "graph.json"]).is_err());
    }

    #[test]
    fn parse_impact() {
        let cli = Cli::parse_from(["kiln", "impact", "graph.json", "UserModel"]);
        match cli.command {
            Command::Impact(args) => assert_eq!(args.artifact, "UserModel"),
            _ => panic!("expected Impact command"),
        }
    }

    #[test]
    fn parse_cache_clear_all_and_one() {
        let cli = Cli::parse_from(["kiln", "cache", "clear"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheCommand::Clear { artifact: None }
            }
        ));

        let cli = Cli::parse_from(["kiln", "cache", "clear", "A"]);
        match cli.command {
            Command::Cache {
                action: CacheCommand::Clear { artifact },
            } => assert_eq!(artifact.as_deref(), Some("A")),
            _ => panic!("expected cache clear"),
        }
    }

    #[test]
    fn parse_recovery_list_archived() {
        let cli = Cli::parse_from(["kiln", "recovery", "list", "--archived"]);
        match cli.command {
            Command::Recovery {
                action: RecoveryCommand::List { archived, format },
            } => {
                assert!(archived);
                assert_eq!(format, ReportFormat::Text);
            }
            _ => panic!("expected recovery list"),
        }
    }

    #[test]
    fn parse_recovery_show_context() {
        let cli = Cli::parse_from(["kiln", "recovery", "show", "abc1", "--context"]);
        match cli.command {
            Command::Recovery {
                action: RecoveryCommand::Show { id, context, .. },
            } => {
                assert_eq!(id, "abc1");
                assert!(context);
            }
            _ => panic!("expected recovery show"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "kiln", "-q", "--config", "ci/kiln.toml", "cache", "stats",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("ci/kiln.toml")));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["kiln", "cache", "list", "--verbose"]);
        assert!(cli.verbose);
    }
}
