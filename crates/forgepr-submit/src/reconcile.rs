// reconcile.rs — The single caller-facing operation.
//
// reconcile() runs branch → read → compile → commit → PR strictly in order;
// each stage depends on the remote state the previous one left behind. Any
// failure aborts the remaining stages and is returned as-is: nothing is
// retried and nothing already written is rolled back.

use forgepr_changeset::{compile, scope, Action, Branch, ChangeSet, Commit, PullRequest};
use serde::Serialize;

use crate::branch;
use crate::error::Result;
use crate::provider::GitProvider;
use crate::pull_request::{self, DescriptionContext};
use crate::tree::{self, ReadOptions};

/// Everything a reconcile needs from the caller.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub reset_source_branch_if_exists: bool,
    pub scope_path: Option<String>,
    pub changes: ChangeSet,
    pub commit_message: String,
    pub title: String,
    pub description: Option<String>,
    /// Used when `description` is `None`; see [`pull_request::render_description`].
    pub description_template: Option<String>,
}

impl ReconcileRequest {
    pub fn new(
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        changes: ChangeSet,
        commit_message: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
            reset_source_branch_if_exists: false,
            scope_path: None,
            changes,
            commit_message: commit_message.into(),
            title: title.into(),
            description: None,
            description_template: None,
        }
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset_source_branch_if_exists = reset;
        self
    }

    pub fn with_scope(mut self, scope_path: Option<impl Into<String>>) -> Self {
        self.scope_path = scope_path.map(Into::into);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_description_template(mut self, template: impl Into<String>) -> Self {
        self.description_template = Some(template.into());
        self
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            scope_path: scope::normalize_scope(self.scope_path.as_deref()),
            specific_files: Some(self.changes.paths().map(str::to_string).collect()),
            recursive: true,
        }
    }

    fn render_description(&self, actions: &[Action]) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.description_template {
            Some(template) => pull_request::render_description(
                template,
                &DescriptionContext {
                    title: &self.title,
                    source_branch: &self.source_branch,
                    target_branch: &self.target_branch,
                    actions,
                },
            ),
            None => String::new(),
        }
    }
}

/// What a completed reconcile did.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Source branch after the commit.
    pub branch: Branch,
    pub actions: Vec<Action>,
    /// `None` when the changeset was empty and no commit was attempted.
    pub commit: Option<Commit>,
    pub pull_request: PullRequest,
}

/// What a reconcile would do, computed without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    /// Branch the baseline was read from.
    pub baseline: Branch,
    /// Whether the source branch would be created (or recreated by a reset).
    pub creates_source_branch: bool,
    pub actions: Vec<Action>,
}

/// Runs reconciles against one provider session.
pub struct Reconciler<'a> {
    provider: &'a dyn GitProvider,
}

impl<'a> Reconciler<'a> {
    pub fn new(provider: &'a dyn GitProvider) -> Self {
        Self { provider }
    }

    /// prepare → read → compile → commit → create-or-update PR.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome> {
        let provider = self.provider;
        let options = request.read_options();

        let mut source = branch::prepare(
            provider,
            &request.source_branch,
            &request.target_branch,
            request.reset_source_branch_if_exists,
        )
        .await?;

        let existing = if request.changes.is_empty() {
            Default::default()
        } else {
            tree::list(provider, &source, &options).await?
        };

        let actions = compile(&existing, &request.changes, options.scope_path.as_deref());

        let commit = if actions.is_empty() {
            tracing::info!("{}: empty changeset, nothing to commit", provider.name());
            None
        } else {
            let commit = provider
                .commit(&source, &actions, &request.commit_message)
                .await?;
            tracing::info!(
                "{}: {} action(s) on {} committed as {}",
                provider.name(),
                actions.len(),
                source.name,
                commit.short_sha()
            );
            source.head_commit_id = commit.sha.clone();
            Some(commit)
        };

        let description = request.render_description(&actions);
        let pull_request = pull_request::create_or_update(
            provider,
            &request.source_branch,
            &request.target_branch,
            &request.title,
            &description,
        )
        .await?;

        Ok(ReconcileOutcome {
            branch: source,
            actions,
            commit,
            pull_request,
        })
    }

    /// Read and compile only. The baseline is the source branch when it
    /// exists and would be kept, otherwise the target branch.
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<ReconcilePlan> {
        let provider = self.provider;
        let target = provider
            .get_branch(&request.target_branch)
            .await?
            .ok_or_else(|| crate::error::SubmitError::BranchNotFound {
                branch: request.target_branch.clone(),
            })?;
        let source = provider.get_branch(&request.source_branch).await?;

        let (baseline, creates_source_branch) = match source {
            Some(source) if !request.reset_source_branch_if_exists => (source, false),
            _ => (target, true),
        };

        let options = request.read_options();
        let existing = tree::list(provider, &baseline, &options).await?;
        let actions = compile(&existing, &request.changes, options.scope_path.as_deref());

        Ok(ReconcilePlan {
            baseline,
            creates_source_branch,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmitError;
    use crate::providers::memory::MemoryProvider;
    use forgepr_changeset::{ActionKind, ChangeRequest};

    fn request(changes: ChangeSet) -> ReconcileRequest {
        ReconcileRequest::new("feature", "main", changes, "init", "Add files")
    }

    #[tokio::test]
    async fn first_file_on_empty_tree() {
        let provider = MemoryProvider::new().with_branch("main", Vec::<(String, String)>::new());
        let changes = ChangeSet::try_from_iter([("a.txt", "hello")]).unwrap();

        let outcome = Reconciler::new(&provider).reconcile(&request(changes)).await.unwrap();

        assert_eq!(outcome.actions, vec![Action::create("a.txt", "hello")]);
        assert_eq!(outcome.commit.as_ref().unwrap().message, "init");
        assert_eq!(provider.files("feature").unwrap()["a.txt"], "hello");
        assert_eq!(outcome.branch.head_commit_id, provider.head("feature").unwrap());
        assert!(provider.files("main").unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolver_update_then_delete_is_observed_by_next_read() {
        let provider = MemoryProvider::new()
            .with_branch("main", [("cfg.json", "v1"), ("old.txt", "bye")]);
        let mut changes = ChangeSet::new();
        changes
            .insert("cfg.json", ChangeRequest::resolver(|f| Some(format!("{}-v2", f.contents))))
            .unwrap();
        changes.insert("old.txt", ChangeRequest::Delete).unwrap();

        let outcome = Reconciler::new(&provider).reconcile(&request(changes)).await.unwrap();

        assert_eq!(
            outcome.actions,
            vec![Action::update("cfg.json", "v1-v2"), Action::delete("old.txt")]
        );
        let after = tree::list(&provider, &outcome.branch, &ReadOptions::recursive())
            .await
            .unwrap();
        assert_eq!(after["cfg.json"], "v1-v2");
        assert!(!after.contains_key("old.txt"));
    }

    #[tokio::test]
    async fn repeated_reconcile_keeps_one_open_pull_request() {
        let provider = MemoryProvider::new().with_branch("main", [("a.txt", "a")]);
        let reconciler = Reconciler::new(&provider);
        let changes = ChangeSet::try_from_iter([("a.txt", "b")]).unwrap();

        let first = reconciler
            .reconcile(&request(changes.clone()).with_description("one"))
            .await
            .unwrap();
        let mut second_request = request(changes).with_description("two");
        second_request.title = "Renamed".to_string();
        let second = reconciler.reconcile(&second_request).await.unwrap();

        assert_eq!(first.pull_request.id, second.pull_request.id);
        let open = provider.open_pull_requests();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "Renamed");
        assert_eq!(open[0].description, "two");
    }

    #[tokio::test]
    async fn scoped_reconcile_writes_under_scope() {
        let provider = MemoryProvider::new().with_branch("main", [("deploy/app.yaml", "replicas: 1")]);
        let mut changes = ChangeSet::new();
        changes
            .insert("app.yaml", ChangeRequest::resolver(|f| Some(f.contents.replace('1', "2"))))
            .unwrap();
        let req = request(changes).with_scope(Some("deploy"));

        let outcome = Reconciler::new(&provider).reconcile(&req).await.unwrap();

        assert_eq!(outcome.actions[0].kind, ActionKind::Update);
        assert_eq!(provider.files("feature").unwrap()["deploy/app.yaml"], "replicas: 2");
    }

    #[tokio::test]
    async fn delete_of_absent_path_leaves_tree_unchanged() {
        let provider = MemoryProvider::new().with_branch("main", [("keep.txt", "k")]);
        let changes = ChangeSet::try_from_iter([("ghost.txt", ChangeRequest::Delete)]).unwrap();

        let outcome = Reconciler::new(&provider).reconcile(&request(changes)).await.unwrap();

        assert_eq!(outcome.actions, vec![Action::delete("ghost.txt")]);
        assert_eq!(outcome.commit.unwrap().sha, provider.head("main").unwrap());
        assert_eq!(provider.files("feature"), provider.files("main"));
    }

    #[tokio::test]
    async fn template_renders_when_no_description_given() {
        let provider = MemoryProvider::new().with_branch("main", [("a.txt", "a")]);
        let changes = ChangeSet::try_from_iter([("b.txt", "b")]).unwrap();
        let req = request(changes).with_description_template("{change_count} change(s)\n{changes}");

        let outcome = Reconciler::new(&provider).reconcile(&req).await.unwrap();

        assert_eq!(outcome.pull_request.description, "1 change(s)\n- create `b.txt`");
    }

    #[tokio::test]
    async fn commit_failure_stops_before_pull_request() {
        let provider = MemoryProvider::new().with_branch("main", [("a.txt", "a")]);
        provider.fail_on("commit");
        let changes = ChangeSet::try_from_iter([("a.txt", "b")]).unwrap();

        let err = Reconciler::new(&provider).reconcile(&request(changes)).await.unwrap_err();

        assert!(matches!(err, SubmitError::CommitFailed { ref branch, .. } if branch == "feature"));
        assert!(provider.open_pull_requests().is_empty());
    }

    #[tokio::test]
    async fn plan_reads_target_when_source_missing_and_writes_nothing() {
        let provider = MemoryProvider::new().with_branch("main", [("a.txt", "a")]);
        let changes = ChangeSet::try_from_iter([("a.txt", "b"), ("c.txt", "c")]).unwrap();

        let plan = Reconciler::new(&provider).plan(&request(changes)).await.unwrap();

        assert!(plan.creates_source_branch);
        assert_eq!(plan.baseline.name, "main");
        assert_eq!(
            plan.actions,
            vec![Action::update("a.txt", "b"), Action::create("c.txt", "c")]
        );
        assert_eq!(provider.head("feature"), None);
        assert_eq!(provider.commit_count(), 1);
    }
}
