// github.rs — GitHub REST provider.
//
// Commits use the Git Data API ("compose then move the ref"):
//   1. resolve the branch head and its tree (fresh on every call)
//   2. upload blobs for creates/updates concurrently
//   3. POST a tree layered on the head tree; deletes carry `sha: null`
//   4. POST a commit whose single parent is the head
//   5. PATCH refs/heads/<branch> to the new commit (no force)
// The ref only moves in step 5, so a failure anywhere earlier leaves the
// branch untouched. Step 5 fails if someone else moved the ref meanwhile.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgepr_changeset::{Action, Author, Branch, Commit, PullRequest};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubmitError, UpstreamError};
use crate::http::HttpSession;
use crate::provider::{GitProvider, NewPullRequest, PullRequestCreation, TreeEntry};
use crate::tree::MAX_CONCURRENT_FETCHES;

use super::effective_actions;

const FILE_MODE: &str = "100644";

/// GitHub (and GitHub Enterprise) repository addressed as `owner/repo`.
pub struct GitHubProvider {
    http: HttpSession,
    owner: String,
    repo: String,
}

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitTree {
    sha: String,
    tree: Vec<GitTreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitTreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    sha: String,
    message: String,
    author: GitSignature,
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitSignature {
    name: String,
    email: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct NewTreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// `None` serializes as `null`, which removes the path.
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    head: PullRef,
    base: PullRef,
}

#[derive(Debug, Deserialize)]
struct PullRef {
    #[serde(rename = "ref")]
    name: String,
}

impl From<GitCommit> for Commit {
    fn from(c: GitCommit) -> Self {
        Commit {
            sha: c.sha,
            message: c.message,
            author: Author {
                name: c.author.name,
                email: c.author.email,
            },
            date: c.author.date,
        }
    }
}

impl From<PullResponse> for PullRequest {
    fn from(p: PullResponse) -> Self {
        PullRequest {
            id: p.number.to_string(),
            source_branch: p.head.name,
            target_branch: p.base.name,
            title: p.title,
            description: p.body.unwrap_or_default(),
            link: p.html_url,
        }
    }
}

/// True when `path` is `dir` itself or lies below it.
fn is_within(path: &str, dir: &str) -> bool {
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ── Provider ──

impl GitHubProvider {
    pub fn new(http: HttpSession, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            http,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    fn url(&self, tail: &[&str]) -> Url {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str()];
        segments.extend_from_slice(tail);
        self.http.endpoint(&segments)
    }

    fn url_with_path(&self, tail: &[&str], path: &str) -> Url {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str()];
        segments.extend_from_slice(tail);
        self.http.endpoint_with_path(&segments, path)
    }

    async fn head_sha(&self, name: &str) -> std::result::Result<Option<String>, UpstreamError> {
        let url = self.url_with_path(&["git", "ref", "heads"], name);
        let git_ref: Option<GitRef> = self
            .http
            .optional_json(self.http.request(Method::GET, url))
            .await?;
        Ok(git_ref.map(|r| r.object.sha))
    }

    async fn get_commit(&self, sha: &str) -> std::result::Result<GitCommit, UpstreamError> {
        let url = self.url(&["git", "commits", sha]);
        self.http.json(self.http.request(Method::GET, url)).await
    }

    async fn get_tree(
        &self,
        tree_sha: &str,
        recursive: bool,
    ) -> std::result::Result<GitTree, UpstreamError> {
        let mut url = self.url(&["git", "trees", tree_sha]);
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }
        self.http.json(self.http.request(Method::GET, url)).await
    }

    /// Every item under `tree_sha`, with paths relative to the root.
    ///
    /// GitHub caps recursive listings and flags the response as `truncated`.
    /// In that case the tree is walked one level at a time instead, only
    /// descending into directories for which `descend` holds.
    async fn tree_items(
        &self,
        tree_sha: &str,
        descend: &(dyn Fn(&str) -> bool + Sync),
    ) -> std::result::Result<Vec<GitTreeItem>, UpstreamError> {
        let tree = self.get_tree(tree_sha, true).await?;
        if !tree.truncated {
            return Ok(tree.tree);
        }
        tracing::warn!(
            "GitHub: recursive tree {} of {}/{} was truncated; walking it level by level",
            tree.sha,
            self.owner,
            self.repo
        );

        let mut items = Vec::new();
        let mut pending = vec![(String::new(), tree_sha.to_string())];
        while let Some((dir, sha)) = pending.pop() {
            let level = self.get_tree(&sha, false).await?;
            if level.truncated {
                return Err(UpstreamError::new(
                    format!("GET /git/trees/{}", sha),
                    None,
                    format!("directory '{}' has too many entries to list", dir),
                ));
            }
            for mut item in level.tree {
                if !dir.is_empty() {
                    item.path = format!("{}/{}", dir, item.path);
                }
                if item.kind == "tree" && descend(&item.path) {
                    pending.push((item.path.clone(), item.sha.clone()));
                }
                items.push(item);
            }
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn create_blob(&self, content: &str) -> std::result::Result<String, UpstreamError> {
        let url = self.url(&["git", "blobs"]);
        let body = serde_json::json!({ "content": content, "encoding": "utf-8" });
        let blob: GitObject = self
            .http
            .json(self.http.request(Method::POST, url).json(&body))
            .await?;
        Ok(blob.sha)
    }

    async fn tree_item<'a>(
        &self,
        action: &'a Action,
    ) -> std::result::Result<NewTreeItem<'a>, UpstreamError> {
        let sha = if action.is_delete() {
            None
        } else {
            Some(self.create_blob(action.content_str()).await?)
        };
        Ok(NewTreeItem {
            path: &action.path,
            mode: FILE_MODE,
            kind: "blob",
            sha,
        })
    }

    async fn compose(
        &self,
        branch: &str,
        actions: &[Action],
        message: &str,
    ) -> std::result::Result<Option<Commit>, UpstreamError> {
        let Some(head) = self.head_sha(branch).await? else {
            return Ok(None);
        };
        let head_commit = self.get_commit(&head).await?;
        let base_tree = head_commit.tree.sha.clone();

        let present: HashSet<String> = if actions.iter().any(Action::is_delete) {
            let leads_to_delete = |dir: &str| {
                actions
                    .iter()
                    .any(|a| a.is_delete() && is_within(&a.path, dir))
            };
            self.tree_items(&base_tree, &leads_to_delete)
                .await?
                .into_iter()
                .filter(|item| item.kind == "blob")
                .map(|item| item.path)
                .collect()
        } else {
            HashSet::new()
        };
        let actions = effective_actions("GitHub", actions, &present);
        if actions.is_empty() {
            tracing::info!("GitHub: nothing effective to commit on {}", branch);
            return Ok(Some(head_commit.into()));
        }

        let uploads: Vec<_> = actions
            .into_iter()
            .map(|action| self.tree_item(action))
            .collect();
        let items: Vec<NewTreeItem<'_>> = futures::stream::iter(uploads)
            .buffered(MAX_CONCURRENT_FETCHES)
            .try_collect()
            .await?;

        let url = self.url(&["git", "trees"]);
        let body = serde_json::json!({ "base_tree": base_tree, "tree": items });
        let tree: GitObject = self
            .http
            .json(self.http.request(Method::POST, url).json(&body))
            .await?;

        let url = self.url(&["git", "commits"]);
        let body = serde_json::json!({ "message": message, "tree": tree.sha, "parents": [head] });
        let commit: GitCommit = self
            .http
            .json(self.http.request(Method::POST, url).json(&body))
            .await?;

        let url = self.url_with_path(&["git", "refs", "heads"], branch);
        let body = serde_json::json!({ "sha": commit.sha, "force": false });
        self.http
            .empty(self.http.request(Method::PATCH, url).json(&body))
            .await?;

        Ok(Some(commit.into()))
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        let sha = self
            .head_sha(name)
            .await
            .map_err(|upstream| SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "lookup",
                upstream,
            })?;
        Ok(sha.map(|sha| Branch::new(name, sha)))
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<Branch> {
        let url = self.url(&["git", "refs"]);
        let body = serde_json::json!({ "ref": format!("refs/heads/{}", name), "sha": from_sha });
        match self
            .http
            .empty(self.http.request(Method::POST, url).json(&body))
            .await
        {
            Ok(_) => {
                tracing::debug!("GitHub: created ref heads/{} at {}", name, from_sha);
                Ok(Branch::new(name, from_sha))
            }
            Err(e) if e.has_status(422) && e.message_contains("already exists") => {
                Err(SubmitError::BranchAlreadyExists {
                    branch: name.to_string(),
                })
            }
            Err(upstream) => Err(SubmitError::BranchOperationFailed {
                branch: name.to_string(),
                operation: "create",
                upstream,
            }),
        }
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        let url = self.url_with_path(&["git", "refs", "heads"], name);
        match self.http.empty(self.http.request(Method::DELETE, url)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() || e.message_contains("reference does not exist") => {
                Err(SubmitError::BranchNotFound {
                    branch: name.to_string(),
                })
            }
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
        _recursive: bool,
    ) -> Result<Vec<TreeEntry>> {
        let read_err = |upstream| SubmitError::ReadFailed {
            branch: branch.name.clone(),
            path: scope.unwrap_or_default().to_string(),
            upstream,
        };
        let toward_scope = |dir: &str| {
            scope.map_or(true, |s| is_within(s, dir) || is_within(dir, s))
        };
        // A commit sha is accepted wherever a tree sha is.
        let items = self
            .tree_items(&branch.head_commit_id, &toward_scope)
            .await
            .map_err(read_err)?;

        let prefix = scope.map(|s| format!("{}/", s));
        let entries: Vec<TreeEntry> = items
            .into_iter()
            .filter(|item| {
                prefix
                    .as_deref()
                    .map_or(true, |p| item.path.starts_with(p))
            })
            .filter_map(|item| match item.kind.as_str() {
                "blob" => Some(TreeEntry::file(item.path)),
                "tree" => Some(TreeEntry::directory(item.path)),
                _ => None,
            })
            .collect();
        tracing::debug!(
            "GitHub: listed {} entries on {} at {}",
            entries.len(),
            branch.name,
            branch.head_commit_id
        );
        Ok(entries)
    }

    async fn read_file(&self, branch: &Branch, path: &str) -> Result<Option<String>> {
        let mut url = self.url_with_path(&["contents"], path);
        url.query_pairs_mut()
            .append_pair("ref", &branch.head_commit_id);
        self.http
            .optional_text(
                self.http
                    .request_accepting(Method::GET, url, "application/vnd.github.raw"),
            )
            .await
            .map_err(|upstream| SubmitError::ReadFailed {
                branch: branch.name.clone(),
                path: path.to_string(),
                upstream,
            })
    }

    async fn commit(&self, branch: &Branch, actions: &[Action], message: &str) -> Result<Commit> {
        let commit = self
            .compose(&branch.name, actions, message)
            .await
            .map_err(|upstream| SubmitError::CommitFailed {
                branch: branch.name.clone(),
                upstream,
            })?;
        let commit = commit.ok_or_else(|| SubmitError::BranchNotFound {
            branch: branch.name.clone(),
        })?;
        tracing::info!("GitHub: {} now at {}", branch.name, commit.short_sha());
        Ok(commit)
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestCreation> {
        let url = self.url(&["pulls"]);
        let body = serde_json::json!({
            "title": request.title,
            "head": request.source_branch,
            "base": request.target_branch,
            "body": request.description,
        });
        match self
            .http
            .json::<PullResponse>(self.http.request(Method::POST, url).json(&body))
            .await
        {
            Ok(pull) => Ok(PullRequestCreation::Created(pull.into())),
            Err(e) if e.has_status(422) && e.message_contains("a pull request already exists") => {
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
        let mut url = self.url(&["pulls"]);
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("head", &format!("{}:{}", self.owner, source_branch))
            .append_pair("base", target_branch)
            .append_pair("per_page", "100");
        let pulls: Vec<PullResponse> = self.http.get_all_pages(url).await.map_err(|upstream| {
            SubmitError::PullRequestReconciliationFailed {
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                upstream,
            }
        })?;
        Ok(pulls
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
        let url = self.url(&["pulls", id]);
        let body = serde_json::json!({ "title": title, "body": description });
        let pull: PullResponse = self
            .http
            .json(self.http.request(Method::PATCH, url).json(&body))
            .await
            .map_err(|upstream| SubmitError::PullRequestReconciliationFailed {
                source_branch: String::new(),
                target_branch: String::new(),
                upstream,
            })?;
        Ok(pull.into())
    }

    fn name(&self) -> &str {
        "GitHub"
    }
}
