//! Core GitProvider trait and listing types

use async_trait::async_trait;
use forgepr_changeset::{Action, Branch, Commit, PullRequest};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of entry in a tree listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a provider tree listing (full repository path).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPullRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
}

/// Outcome of a creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestCreation {
    Created(PullRequest),
    /// The provider reported an open request for the same (source, target) pair.
    AlreadyExists,
}

/// Provider-agnostic capability interface for a single repository.
///
/// A provider value is the authenticated session for one repository: it is
/// created once by [`crate::providers::connect`] and passed by reference to
/// every reconcile stage. Implementations never retry.
///
/// Running two reconciles against the same source branch concurrently is
/// undefined behaviour (both race on the branch head) and is not guarded.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Resolve a branch by name. `Ok(None)` when it does not exist.
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>>;

    /// Create `name` pointing at `from_sha`.
    ///
    /// Fails with `BranchAlreadyExists` when the name is taken.
    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<Branch>;

    /// Delete a branch.
    async fn delete_branch(&self, name: &str) -> Result<()>;

    /// List entries under `scope` (repository root when `None`) on the
    /// branch head, following every page the provider returns.
    ///
    /// Implementations may return entries outside the requested depth; the
    /// Tree Reader applies the scope and recursion filters.
    async fn list_tree(
        &self,
        branch: &Branch,
        scope: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>>;

    /// Fetch raw file content. `Ok(None)` when the file is absent.
    async fn read_file(&self, branch: &Branch, path: &str) -> Result<Option<String>>;

    /// Apply the whole action list as a single commit on `branch`.
    ///
    /// The branch head advances at most once. Deletes of absent paths are
    /// no-ops; when nothing effective remains the current head is returned.
    async fn commit(&self, branch: &Branch, actions: &[Action], message: &str) -> Result<Commit>;

    /// Try to open a pull request.
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestCreation>;

    /// First open pull request for the (source, target) pair, if any.
    async fn find_open_pull_request(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<PullRequest>>;

    /// Replace title and description of an existing pull request.
    async fn update_pull_request(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<PullRequest>;

    /// Provider display name (for CLI output and logs).
    fn name(&self) -> &str;
}
