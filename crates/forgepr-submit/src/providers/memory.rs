//! In-memory provider - a complete GitProvider over process-local state

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use forgepr_changeset::{Action, ActionKind, Author, Branch, Commit, PullRequest};
use sha2::{Digest, Sha256};

use crate::error::{Result, SubmitError, UpstreamError};
use crate::provider::{GitProvider, NewPullRequest, PullRequestCreation, TreeEntry};

/// Provider that keeps branches, commits and pull requests in memory.
///
/// Behaves like a hosted repository for every GitProvider operation:
/// commits are content-addressed (SHA-256), a branch head moves once per
/// commit, deleting an absent path is a no-op, and at most one open pull
/// request is accepted per (source, target) pair. Used by tests and for
/// exercising reconcile flows without network access.
pub struct MemoryProvider {
    state: Mutex<State>,
    author: Author,
}

#[derive(Default)]
struct State {
    branches: BTreeMap<String, String>,
    commits: HashMap<String, StoredCommit>,
    pulls: Vec<StoredPull>,
    sequence: u64,
    failing: HashSet<&'static str>,
    deleted_after_listing: HashSet<String>,
}

struct StoredCommit {
    commit: Commit,
    tree: BTreeMap<String, String>,
}

struct StoredPull {
    pull: PullRequest,
    open: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            author: Author {
                name: "forgepr".to_string(),
                email: "forgepr@localhost".to_string(),
            },
        }
    }

    /// Add a branch whose head is a root commit holding `files`.
    pub fn with_branch<I, P, C>(self, name: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        {
            let mut state = self.lock();
            let tree: BTreeMap<String, String> = files
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect();
            let sha = state.store_commit(None, "initial commit", tree, &self.author);
            state.branches.insert(name.to_string(), sha);
        }
        self
    }

    /// Make an operation fail with an injected HTTP 500.
    ///
    /// Names match the GitProvider method names, e.g. `"commit"`.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    /// Keep `path` in listings but answer 404 when its content is fetched,
    /// as happens when a file is deleted between listing and fetch.
    pub fn delete_after_listing(&self, path: &str) {
        self.lock().deleted_after_listing.insert(path.to_string());
    }

    /// Files on a branch head, or `None` when the branch does not exist.
    pub fn files(&self, branch: &str) -> Option<BTreeMap<String, String>> {
        let state = self.lock();
        let head = state.branches.get(branch)?;
        state.commits.get(head).map(|c| c.tree.clone())
    }

    /// Current head of a branch.
    pub fn head(&self, branch: &str) -> Option<String> {
        self.lock().branches.get(branch).cloned()
    }

    /// Number of commits created so far (including root commits).
    pub fn commit_count(&self) -> usize {
        self.lock().commits.len()
    }

    pub fn open_pull_requests(&self) -> Vec<PullRequest> {
        self.lock()
            .pulls
            .iter()
            .filter(|p| p.open)
            .map(|p| p.pull.clone())
            .collect()
    }

    /// Close a pull request (it no longer counts as open).
    pub fn close_pull_request(&self, id: &str) {
        if let Some(stored) = self.lock().pulls.iter_mut().find(|p| p.pull.id == id) {
            stored.open = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn check(&self, operation: &'static str) -> std::result::Result<(), UpstreamError> {
        if self.failing.contains(operation) {
            Err(UpstreamError::new(
                format!("memory {}", operation),
                Some(500),
                "injected failure",
            ))
        } else {
            Ok(())
        }
    }

    fn store_commit(
        &mut self,
        parent: Option<&str>,
        message: &str,
        tree: BTreeMap<String, String>,
        author: &Author,
    ) -> String {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(parent.unwrap_or_default().as_bytes());
        hasher.update(message.as_bytes());
        for (path, content) in &tree {
            hasher.update(path.as_bytes());
            hasher.update([0]);
            hasher.update(content.as_bytes());
            hasher.update([0]);
        }
        let sha = format!("{:x}", hasher.finalize());
        let commit = Commit {
            sha: sha.clone(),
            message: message.to_string(),
            author: author.clone(),
            date: Utc::now(),
        };
        self.commits.insert(sha.clone(), StoredCommit { commit, tree });
        sha
    }

    fn head_tree(&self, branch: &str) -> Option<&BTreeMap<String, String>> {
        let head = self.branches.get(branch)?;
        self.commits.get(head).map(|c| &c.tree)
    }
}

#[async_trait]
impl GitProvider for MemoryProvider {
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        let state = self.lock();
        state
            .check("get_branch")
            .map_err(|upstream| SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "lookup",
                upstream,
            })?;
        Ok(state
            .branches
            .get(name)
            .map(|head| Branch::new(name, head.clone())))
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<Branch> {
        let mut state = self.lock();
        let op_err = |upstream| SubmitError::BranchOperationFailed {
            branch: name.to_string(),
            operation: "create",
            upstream,
        };
        state.check("create_branch").map_err(op_err)?;
        if state.branches.contains_key(name) {
            return Err(SubmitError::BranchAlreadyExists {
                branch: name.to_string(),
            });
        }
        if !state.commits.contains_key(from_sha) {
            return Err(op_err(UpstreamError::new(
                "memory create_branch",
                Some(422),
                format!("unknown commit {}", from_sha),
            )));
        }
        state.branches.insert(name.to_string(), from_sha.to_string());
        tracing::debug!("MemoryProvider: created branch {} at {}", name, from_sha);
        Ok(Branch::new(name, from_sha))
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .check("delete_branch")
            .map_err(|upstream| SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "delete",
                upstream,
            })?;
        match state.branches.remove(name) {
            Some(_) => Ok(()),
            None => Err(SubmitError::BranchNotFound {
                branch: name.to_string(),
            }),
        }
    }

    async fn list_tree(
        &self,
        branch: &Branch,
        scope: Option<&str>,
        _recursive: bool,
    ) -> Result<Vec<TreeEntry>> {
        let state = self.lock();
        let read_err = |upstream| SubmitError::ReadFailed {
            branch: branch.name.clone(),
            path: scope.unwrap_or_default().to_string(),
            upstream,
        };
        state.check("list_tree").map_err(read_err)?;
        let tree = state
            .commits
            .get(&branch.head_commit_id)
            .map(|c| &c.tree)
            .ok_or_else(|| {
                read_err(UpstreamError::new(
                    "memory list_tree",
                    Some(404),
                    format!("unknown commit {}", branch.head_commit_id),
                ))
            })?;

        let prefix = scope.map(|s| format!("{}/", s));
        let mut directories = BTreeSet::new();
        let mut entries = Vec::new();
        for path in tree.keys() {
            if let Some(prefix) = &prefix {
                if !path.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            // Implicit parent directories, like a real tree listing has.
            let mut end = 0;
            while let Some(pos) = path[end..].find('/') {
                end += pos;
                directories.insert(path[..end].to_string());
                end += 1;
            }
            entries.push(TreeEntry::file(path.clone()));
        }
        entries.extend(directories.into_iter().map(TreeEntry::directory));
        Ok(entries)
    }

    async fn read_file(&self, branch: &Branch, path: &str) -> Result<Option<String>> {
        let state = self.lock();
        state
            .check("read_file")
            .map_err(|upstream| SubmitError::ReadFailed {
                branch: branch.name.clone(),
                path: path.to_string(),
                upstream,
            })?;
        if state.deleted_after_listing.contains(path) {
            return Ok(None);
        }
        Ok(state
            .commits
            .get(&branch.head_commit_id)
            .and_then(|c| c.tree.get(path).cloned()))
    }

    async fn commit(&self, branch: &Branch, actions: &[Action], message: &str) -> Result<Commit> {
        let mut state = self.lock();
        state
            .check("commit")
            .map_err(|upstream| SubmitError::CommitFailed {
                branch: branch.name.clone(),
                upstream,
            })?;
        let head = state
            .branches
            .get(&branch.name)
            .cloned()
            .ok_or_else(|| SubmitError::BranchNotFound {
                branch: branch.name.clone(),
            })?;
        let mut tree = state.head_tree(&branch.name).cloned().unwrap_or_default();

        let mut effective = 0;
        for action in actions {
            match action.kind {
                ActionKind::Create | ActionKind::Update => {
                    tree.insert(action.path.clone(), action.content_str().to_string());
                    effective += 1;
                }
                ActionKind::Delete => {
                    if tree.remove(&action.path).is_some() {
                        effective += 1;
                    } else {
                        tracing::debug!("MemoryProvider: delete of absent {} skipped", action.path);
                    }
                }
            }
        }

        if effective == 0 {
            return state
                .commits
                .get(&head)
                .map(|c| c.commit.clone())
                .ok_or_else(|| SubmitError::BranchNotFound {
                    branch: branch.name.clone(),
                });
        }

        let sha = state.store_commit(Some(&head), message, tree, &self.author);
        state.branches.insert(branch.name.clone(), sha.clone());
        state
            .commits
            .get(&sha)
            .map(|c| c.commit.clone())
            .ok_or_else(|| SubmitError::BranchNotFound {
                branch: branch.name.clone(),
            })
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestCreation> {
        let mut state = self.lock();
        let pr_err = |upstream| SubmitError::PullRequestReconciliationFailed {
            source_branch: request.source_branch.clone(),
            target_branch: request.target_branch.clone(),
            upstream,
        };
        state.check("create_pull_request").map_err(pr_err)?;
        for name in [&request.source_branch, &request.target_branch] {
            if !state.branches.contains_key(name.as_str()) {
                return Err(pr_err(UpstreamError::new(
                    "memory create_pull_request",
                    Some(422),
                    format!("branch {} does not exist", name),
                )));
            }
        }
        if state
            .pulls
            .iter()
            .any(|p| p.open && p.pull.matches(&request.source_branch, &request.target_branch))
        {
            return Ok(PullRequestCreation::AlreadyExists);
        }

        let id = (state.pulls.len() + 1).to_string();
        let pull = PullRequest {
            link: format!("memory://pulls/{}", id),
            id,
            source_branch: request.source_branch.clone(),
            target_branch: request.target_branch.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
        };
        state.pulls.push(StoredPull {
            pull: pull.clone(),
            open: true,
        });
        Ok(PullRequestCreation::Created(pull))
    }

    async fn find_open_pull_request(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<PullRequest>> {
        let state = self.lock();
        state
            .check("find_open_pull_request")
            .map_err(|upstream| SubmitError::PullRequestReconciliationFailed {
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                upstream,
            })?;
        Ok(state
            .pulls
            .iter()
            .find(|p| p.open && p.pull.matches(source_branch, target_branch))
            .map(|p| p.pull.clone()))
    }

    async fn update_pull_request(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<PullRequest> {
        let mut state = self.lock();
        let failure = state.check("update_pull_request").err();
        let stored = state.pulls.iter_mut().find(|p| p.pull.id == id);
        match (failure, stored) {
            (None, Some(stored)) => {
                stored.pull.title = title.to_string();
                stored.pull.description = description.to_string();
                Ok(stored.pull.clone())
            }
            (failure, stored) => {
                let (source_branch, target_branch) = stored
                    .map(|s| (s.pull.source_branch.clone(), s.pull.target_branch.clone()))
                    .unwrap_or_default();
                Err(SubmitError::PullRequestReconciliationFailed {
                    source_branch,
                    target_branch,
                    upstream: failure.unwrap_or_else(|| {
                        UpstreamError::new(
                            "memory update_pull_request",
                            Some(404),
                            format!("pull request {} not found", id),
                        )
                    }),
                })
            }
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
