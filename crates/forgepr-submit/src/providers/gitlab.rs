// gitlab.rs — GitLab REST (v4) provider.
//
// The project is addressed by its URL-encoded full path, so nested groups
// work without a numeric id lookup. Commits are a single atomic
// `POST /repository/commits` carrying every action; GitLab rejects a
// `create` for an existing path and an `update` or `delete` for a missing
// one, so each action's verb is decided against the branch's current
// tree right before the request.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgepr_changeset::{Action, Author, Branch, Commit, PullRequest};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubmitError, UpstreamError};
use crate::http::HttpSession;
use crate::provider::{GitProvider, NewPullRequest, PullRequestCreation, TreeEntry};

use super::effective_actions;

const PER_PAGE: &str = "100";

/// GitLab project addressed by `group[/subgroup…]/project`.
pub struct GitLabProvider {
    http: HttpSession,
    project: String,
}

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    id: String,
    message: String,
    author_name: String,
    author_email: String,
    authored_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CommitAction<'a> {
    action: &'static str,
    file_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    web_url: String,
    source_branch: String,
    target_branch: String,
}

impl From<CommitResponse> for Commit {
    fn from(c: CommitResponse) -> Self {
        Commit {
            sha: c.id,
            message: c.message,
            author: Author {
                name: c.author_name,
                email: c.author_email,
            },
            date: c.authored_date,
        }
    }
}

impl From<MergeRequestResponse> for PullRequest {
    fn from(mr: MergeRequestResponse) -> Self {
        PullRequest {
            id: mr.iid.to_string(),
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
            title: mr.title,
            description: mr.description.unwrap_or_default(),
            link: mr.web_url,
        }
    }
}

/// Directories whose listing covers every path in `paths`.
fn parent_directories<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    paths
        .map(|path| match path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        })
        .collect()
}

// ── Provider ──

impl GitLabProvider {
    pub fn new(http: HttpSession, project: impl Into<String>) -> Self {
        Self {
            http,
            project: project.into(),
        }
    }

    fn url(&self, tail: &[&str]) -> Url {
        let mut segments = vec!["projects", self.project.as_str()];
        segments.extend_from_slice(tail);
        self.http.endpoint(&segments)
    }

    async fn fetch_branch(&self, name: &str) -> std::result::Result<Option<Branch>, UpstreamError> {
        let url = self.url(&["repository", "branches", name]);
        let branch: Option<BranchResponse> = self
            .http
            .optional_json(self.http.request(Method::GET, url))
            .await?;
        Ok(branch.map(|b| Branch::new(b.name, b.commit.id)))
    }

    /// Every page of `repository/tree`; a missing directory lists as empty.
    async fn tree_items(
        &self,
        sha: &str,
        path: Option<&str>,
        recursive: bool,
    ) -> std::result::Result<Vec<TreeItem>, UpstreamError> {
        let mut url = self.url(&["repository", "tree"]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("ref", sha)
                .append_pair("per_page", PER_PAGE)
                .append_pair("recursive", if recursive { "true" } else { "false" });
            if let Some(path) = path.filter(|p| !p.is_empty()) {
                query.append_pair("path", path);
            }
        }
        match self.http.get_all_pages(url).await {
            Ok(items) => Ok(items),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Files currently present next to the paths `actions` touch.
    async fn present_files(
        &self,
        sha: &str,
        actions: &[Action],
    ) -> std::result::Result<HashSet<String>, UpstreamError> {
        let mut present = HashSet::new();
        for dir in parent_directories(actions.iter().map(|a| a.path.as_str())) {
            let items = self.tree_items(sha, Some(&dir), false).await?;
            present.extend(
                items
                    .into_iter()
                    .filter(|item| item.kind == "blob")
                    .map(|item| item.path),
            );
        }
        Ok(present)
    }

    async fn get_commit(&self, sha: &str) -> std::result::Result<Commit, UpstreamError> {
        let url = self.url(&["repository", "commits", sha]);
        let commit: CommitResponse = self.http.json(self.http.request(Method::GET, url)).await?;
        Ok(commit.into())
    }

    async fn apply(
        &self,
        branch: &str,
        actions: &[Action],
        message: &str,
    ) -> std::result::Result<Option<Commit>, UpstreamError> {
        let Some(head) = self.fetch_branch(branch).await? else {
            return Ok(None);
        };
        let present = self.present_files(&head.head_commit_id, actions).await?;
        let effective = effective_actions("GitLab", actions, &present);
        if effective.is_empty() {
            tracing::info!("GitLab: nothing effective to commit on {}", branch);
            return self.get_commit(&head.head_commit_id).await.map(Some);
        }

        let payload: Vec<CommitAction<'_>> = effective
            .iter()
            .map(|action| {
                let verb = if action.is_delete() {
                    "delete"
                } else if present.contains(&action.path) {
                    "update"
                } else {
                    "create"
                };
                CommitAction {
                    action: verb,
                    file_path: &action.path,
                    content: (!action.is_delete()).then(|| action.content_str()),
                }
            })
            .collect();
        let delete_only = effective.iter().all(|a| a.is_delete());

        let url = self.url(&["repository", "commits"]);
        let body = serde_json::json!({
            "branch": branch,
            "commit_message": message,
            "actions": payload,
        });
        match self
            .http
            .json::<CommitResponse>(self.http.request(Method::POST, url).json(&body))
            .await
        {
            Ok(commit) => Ok(Some(commit.into())),
            // Raced with another delete of the same paths.
            Err(e) if delete_only && (e.is_not_found() || e.message_contains("doesn't exist")) => {
                tracing::warn!("GitLab: delete-only commit on {} found nothing to delete", branch);
                self.get_commit(&head.head_commit_id).await.map(Some)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl GitProvider for GitLabProvider {
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        self.fetch_branch(name)
            .await
            .map_err(|upstream| SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "lookup",
                upstream,
            })
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<Branch> {
        let mut url = self.url(&["repository", "branches"]);
        url.query_pairs_mut()
            .append_pair("branch", name)
            .append_pair("ref", from_sha);
        match self
            .http
            .json::<BranchResponse>(self.http.request(Method::POST, url))
            .await
        {
            Ok(branch) => {
                tracing::debug!("GitLab: created branch {} at {}", name, from_sha);
                Ok(Branch::new(branch.name, branch.commit.id))
            }
            Err(e) if e.message_contains("already exists") => Err(SubmitError::BranchAlreadyExists {
                branch: name.to_string(),
            }),
            Err(upstream) => Err(SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "create",
                upstream,
            }),
        }
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        let url = self.url(&["repository", "branches", name]);
        match self.http.empty(self.http.request(Method::DELETE, url)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(SubmitError::BranchNotFound {
                branch: name.to_string(),
            }),
            Err(upstream) => Err(SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "delete",
                upstream,
            }),
        }
    }

    async fn list_tree(
        &self,
        branch: &Branch,
        scope: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>> {
        let items = self
            .tree_items(&branch.head_commit_id, scope, recursive)
            .await
            .map_err(|upstream| SubmitError::ReadFailed {
                branch: branch.name.clone(),
                path: scope.unwrap_or_default().to_string(),
                upstream,
            })?;
        tracing::debug!("GitLab: listed {} entries on {}", items.len(), branch.name);
        Ok(items
            .into_iter()
            .filter_map(|item| match item.kind.as_str() {
                "blob" => Some(TreeEntry::file(item.path)),
                "tree" => Some(TreeEntry::directory(item.path)),
                _ => None,
            })
            .collect())
    }

    async fn read_file(&self, branch: &Branch, path: &str) -> Result<Option<String>> {
        let mut url = self.url(&["repository", "files", path, "raw"]);
        url.query_pairs_mut()
            .append_pair("ref", &branch.head_commit_id);
        self.http
            .optional_text(self.http.request_accepting(Method::GET, url, "*/*"))
            .await
            .map_err(|upstream| SubmitError::ReadFailed {
                branch: branch.name.clone(),
                path: path.to_string(),
                upstream,
            })
    }

    async fn commit(&self, branch: &Branch, actions: &[Action], message: &str) -> Result<Commit> {
        let commit = self
            .apply(&branch.name, actions, message)
            .await
            .map_err(|upstream| SubmitError::CommitFailed {
                branch: branch.name.clone(),
                upstream,
            })?
            .ok_or_else(|| SubmitError::BranchNotFound {
                branch: branch.name.clone(),
            })?;
        tracing::info!("GitLab: {} now at {}", branch.name, commit.short_sha());
        Ok(commit)
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestCreation> {
        let url = self.url(&["merge_requests"]);
        let body = serde_json::json!({
            "source_branch": request.source_branch,
            "target_branch": request.target_branch,
            "title": request.title,
            "description": request.description,
        });
        match self
            .http
            .json::<MergeRequestResponse>(self.http.request(Method::POST, url).json(&body))
            .await
        {
            Ok(mr) => Ok(PullRequestCreation::Created(mr.into())),
            Err(e) if e.has_status(409) && e.message_contains("already exists") => {
                Ok(PullRequestCreation::AlreadyExists)
            }
            Err(upstream) => Err(SubmitError::PullRequestReconciliationFailed {
                source_branch: request.source_branch.clone(),
                target_branch: request.target_branch.clone(),
                upstream,
            }),
        }
    }

    async fn find_open_pull_request(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<PullRequest>> {
        let mut url = self.url(&["merge_requests"]);
        url.query_pairs_mut()
            .append_pair("state", "opened")
            .append_pair("source_branch", source_branch)
            .append_pair("target_branch", target_branch)
            .append_pair("per_page", PER_PAGE);
        let mrs: Vec<MergeRequestResponse> =
            self.http.get_all_pages(url).await.map_err(|upstream| {
                SubmitError::PullRequestReconciliationFailed {
                    source_branch: source_branch.to_string(),
                    target_branch: target_branch.to_string(),
                    upstream,
                }
            })?;
        Ok(mrs
            .into_iter()
            .map(PullRequest::from)
            .find(|pr| pr.matches(source_branch, target_branch)))
    }

    async fn update_pull_request(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<PullRequest> {
        let url = self.url(&["merge_requests", id]);
        let body = serde_json::json!({ "title": title, "description": description });
        let mr: MergeRequestResponse = self
            .http
            .json(self.http.request(Method::PUT, url).json(&body))
            .await
            .map_err(|upstream| SubmitError::PullRequestReconciliationFailed {
                source_branch: String::new(),
                target_branch: String::new(),
                upstream,
            })?;
        Ok(mr.into())
    }

    fn name(&self) -> &str {
        "GitLab"
    }
}
