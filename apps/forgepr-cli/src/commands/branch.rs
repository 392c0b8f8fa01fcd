// branch.rs — Branch subcommands: prepare.

use clap::Subcommand;
use forgepr_submit::branch;

use super::Context;

#[derive(Subcommand)]
pub enum BranchCommands {
    /// Create the source branch from the target, or reset it.
    Prepare {
        /// Source branch name (the configured prefix is applied).
        #[arg(long)]
        source: String,
        /// Target branch (defaults to reconcile.target_branch).
        #[arg(long)]
        target: Option<String>,
        /// Recreate the source branch from the target if it exists.
        #[arg(long)]
        reset: bool,
    },
}

pub async fn execute(cmd: &BranchCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        BranchCommands::Prepare {
            source,
            target,
            reset,
        } => {
            let defaults = &ctx.config.reconcile;
            let source = defaults.source_branch_name(source);
            let target = target.as_deref().unwrap_or(&defaults.target_branch);
            let provider = ctx.connect()?;
            let prepared = branch::prepare(
                provider.as_ref(),
                &source,
                target,
                *reset || defaults.reset_source_branch,
            )
            .await?;
            println!("{} at {}", prepared.name, prepared.head_commit_id);
            Ok(())
        }
    }
}
