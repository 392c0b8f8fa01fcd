// read.rs — `forgepr read`: print files on a branch head.

use clap::Args;
use forgepr_submit::{tree, ReadOptions, SubmitError};

use super::Context;

#[derive(Args)]
pub struct ReadArgs {
    /// Branch to read (defaults to reconcile.target_branch).
    #[arg(long)]
    branch: Option<String>,
    /// Subtree to read (defaults to reconcile.scope_path).
    #[arg(long)]
    scope: Option<String>,
    /// Include files in subdirectories.
    #[arg(long)]
    recursive: bool,
    /// Only these scope-relative paths (repeatable). Missing ones are reported.
    #[arg(long = "only", value_name = "PATH")]
    only: Vec<String>,
    /// Print file contents, not just paths.
    #[arg(long)]
    contents: bool,
    /// Print JSON.
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: &ReadArgs, ctx: &Context) -> anyhow::Result<()> {
    let defaults = &ctx.config.reconcile;
    let branch_name = args.branch.as_deref().unwrap_or(&defaults.target_branch);
    let scope = args.scope.as_deref().or(defaults.scope_path.as_deref());

    let provider = ctx.connect()?;
    let branch = provider
        .get_branch(branch_name)
        .await?
        .ok_or_else(|| SubmitError::BranchNotFound {
            branch: branch_name.to_string(),
        })?;

    let mut options = ReadOptions {
        recursive: args.recursive,
        ..ReadOptions::default()
    }
    .with_scope(scope);
    if !args.only.is_empty() {
        options = options.with_files(args.only.iter().cloned());
    }

    let entries = tree::entries(provider.as_ref(), &branch, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No files on {} (scope: {}).", branch.name, scope.unwrap_or("/"));
        return Ok(());
    }
    for entry in &entries {
        if !entry.exists {
            println!("{}  (absent)", entry.path);
        } else if args.contents {
            println!("── {} ──", entry.path);
            print!("{}", entry.content);
            if !entry.content.ends_with('\n') {
                println!();
            }
        } else {
            println!("{}", entry.path);
        }
    }
    Ok(())
}
