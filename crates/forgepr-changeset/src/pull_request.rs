// pull_request.rs — The review request a reconcile ends with.

use serde::{Deserialize, Serialize};

/// A pull request (GitHub), merge request (GitLab) or pull request (Bitbucket).
///
/// `id` is whatever the provider uses to address the request in follow-up
/// calls: the PR number on GitHub, the `iid` on GitLab, the id on Bitbucket.
/// At most one open request should exist per (source, target) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    /// Browser URL of the request.
    pub link: String,
}

impl PullRequest {
    /// True when this request is for the given (source, target) pair.
    pub fn matches(&self, source_branch: &str, target_branch: &str) -> bool {
        self.source_branch == source_branch && self.target_branch == target_branch
    }
}
