// reconcile.rs — `forgepr reconcile`: the full branch → commit → PR flow.
//
// Changes come from repeatable flags and are added in this order:
// --set, --file, --append, --delete. A later flag for the same path
// replaces an earlier one. --append is the only resolver: it sees the
// current file (empty when absent) and appends to it.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use clap::Args;
use forgepr_changeset::{ChangeRequest, ChangeSet};
use forgepr_submit::{ReconcileOutcome, ReconcilePlan, ReconcileRequest, Reconciler};

use super::{parse_assignment, Context};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Source branch name (the configured prefix is applied).
    #[arg(long)]
    source: String,
    /// Target branch (defaults to reconcile.target_branch).
    #[arg(long)]
    target: Option<String>,
    /// Recreate the source branch from the target if it exists.
    #[arg(long)]
    reset: bool,
    /// Subtree all paths are relative to (defaults to reconcile.scope_path).
    #[arg(long)]
    scope: Option<String>,
    /// Commit message.
    #[arg(long, short = 'm')]
    message: String,
    /// Pull request title.
    #[arg(long)]
    title: String,
    /// Pull request description (overrides reconcile.pr_template).
    #[arg(long)]
    description: Option<String>,
    /// Write literal content: PATH=CONTENT (repeatable).
    #[arg(long = "set", value_name = "PATH=CONTENT")]
    set: Vec<String>,
    /// Write a local file's content: PATH=LOCAL_FILE (repeatable).
    #[arg(long = "file", value_name = "PATH=LOCAL_FILE")]
    file: Vec<String>,
    /// Append text to the current content: PATH=TEXT (repeatable).
    #[arg(long = "append", value_name = "PATH=TEXT")]
    append: Vec<String>,
    /// Delete a path (repeatable).
    #[arg(long = "delete", value_name = "PATH")]
    delete: Vec<String>,
    /// Only print the actions that would be committed.
    #[arg(long)]
    dry_run: bool,
    /// Print JSON.
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: &ReconcileArgs, ctx: &Context) -> anyhow::Result<()> {
    let changes = build_changes(args)?;
    let request = build_request(args, ctx, changes)?;
    let provider = ctx.connect()?;
    let reconciler = Reconciler::new(provider.as_ref());

    if args.dry_run {
        let plan = reconciler.plan(&request).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&request, &plan);
        }
        return Ok(());
    }

    let outcome = reconciler.reconcile(&request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn build_changes(args: &ReconcileArgs) -> anyhow::Result<ChangeSet> {
    let mut changes = ChangeSet::new();
    for raw in &args.set {
        let (path, content) = parse_assignment(raw)?;
        changes.insert(&path, content)?;
    }
    for raw in &args.file {
        let (path, local) = parse_assignment(raw)?;
        let content = fs::read_to_string(Path::new(&local))
            .with_context(|| format!("reading {} for {}", local, path))?;
        changes.insert(&path, content)?;
    }
    for raw in &args.append {
        let (path, text) = parse_assignment(raw)?;
        changes.insert(
            &path,
            ChangeRequest::resolver(move |state| Some(format!("{}{}", state.contents, text))),
        )?;
    }
    for path in &args.delete {
        changes.insert(path, ChangeRequest::Delete)?;
    }
    Ok(changes)
}

fn build_request(
    args: &ReconcileArgs,
    ctx: &Context,
    changes: ChangeSet,
) -> anyhow::Result<ReconcileRequest> {
    let defaults = &ctx.config.reconcile;
    let target = args
        .target
        .clone()
        .unwrap_or_else(|| defaults.target_branch.clone());
    let scope = args.scope.clone().or_else(|| defaults.scope_path.clone());

    let mut request = ReconcileRequest::new(
        defaults.source_branch_name(&args.source),
        target,
        changes,
        args.message.clone(),
        args.title.clone(),
    )
    .with_reset(args.reset || defaults.reset_source_branch)
    .with_scope(scope);

    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    } else if let Some(template) = &defaults.pr_template {
        let path = ctx.resolve(template);
        let template = fs::read_to_string(&path)
            .with_context(|| format!("reading PR template {}", path.display()))?;
        request = request.with_description_template(template);
    }
    Ok(request)
}

fn print_plan(request: &ReconcileRequest, plan: &ReconcilePlan) {
    if plan.creates_source_branch {
        println!(
            "Would create {} from {} at {}",
            request.source_branch, plan.baseline.name, plan.baseline.head_commit_id
        );
    } else {
        println!(
            "Would commit on {} at {}",
            plan.baseline.name, plan.baseline.head_commit_id
        );
    }
    if plan.actions.is_empty() {
        println!("  (no changes)");
    }
    for action in &plan.actions {
        println!("  {:<6} {}", action.kind, action.path);
    }
}

fn print_outcome(outcome: &ReconcileOutcome) {
    match &outcome.commit {
        Some(commit) => println!(
            "Committed {} action(s) to {} as {}",
            outcome.actions.len(),
            outcome.branch.name,
            commit.short_sha()
        ),
        None => println!("No changes to commit on {}", outcome.branch.name),
    }
    for action in &outcome.actions {
        println!("  {:<6} {}", action.kind, action.path);
    }
    println!(
        "Pull request #{}: {}",
        outcome.pull_request.id, outcome.pull_request.link
    );
}
