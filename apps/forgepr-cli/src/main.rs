//! # forgepr
//!
//! Command-line interface for forgepr.
//!
//! Applies a set of file changes to a branch on GitHub, GitLab or Bitbucket
//! and leaves exactly one open pull request for it:
//! - `forgepr reconcile` — prepare branch, commit changes, create or update the PR
//! - `forgepr read` — print files on a branch (optionally scoped)
//! - `forgepr branch prepare` — create or reset a source branch only
//! - `forgepr config init/show` — write a starter `.forgepr.toml`, print the effective one

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// forgepr — one PR workflow across GitHub, GitLab and Bitbucket.
#[derive(Parser)]
#[command(name = "forgepr", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Config file (defaults to <project-root>/.forgepr.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit changes to a source branch and create or update its pull request.
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Print files on a branch.
    Read(commands::read::ReadArgs),
    /// Manage source branches.
    Branch {
        #[command(subcommand)]
        command: commands::branch::BranchCommands,
    },
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays parseable (--json).
    let filter = EnvFilter::try_from_env("FORGEPR_LOG")
        .unwrap_or_else(|_| EnvFilter::new("forgepr_submit=info,forgepr=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config_path = cli
        .config
        .unwrap_or_else(|| project_root.join(forgepr_submit::CONFIG_FILE_NAME));

    match &cli.command {
        Commands::Config { command } => commands::config::execute(command, &config_path),
        Commands::Reconcile(args) => {
            let ctx = commands::Context::load(project_root, &config_path)?;
            commands::reconcile::execute(args, &ctx).await
        }
        Commands::Read(args) => {
            let ctx = commands::Context::load(project_root, &config_path)?;
            commands::read::execute(args, &ctx).await
        }
        Commands::Branch { command } => {
            let ctx = commands::Context::load(project_root, &config_path)?;
            commands::branch::execute(command, &ctx).await
        }
    }
}
