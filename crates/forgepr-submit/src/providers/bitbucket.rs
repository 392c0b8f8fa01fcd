// bitbucket.rs — Bitbucket Cloud (2.0) provider.
//
// Bitbucket has no tree or blob API for writing. A commit is one multipart
// `POST /src`: every created or updated file is a form field named by its
// path, every deleted path is a repeated `files` field, plus `message` and
// `branch`. The two collections are built separately from the action list
// and never overlap. The response carries no commit, so the branch head is
// fetched again afterwards.
//
// Listings are paginated through the JSON `next` link and do not recurse
// on their own; directories are walked explicitly.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgepr_changeset::{Action, Author, Branch, Commit, PullRequest};
use reqwest::multipart::Form;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, SubmitError, UpstreamError};
use crate::http::HttpSession;
use crate::provider::{GitProvider, NewPullRequest, PullRequestCreation, TreeEntry};

use super::effective_actions;

const PAGE_LEN: &str = "100";

/// Bitbucket repository addressed as `workspace/repo_slug`.
pub struct BitbucketProvider {
    http: HttpSession,
    workspace: String,
    repo: String,
}

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
    target: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct SrcEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    hash: String,
    #[serde(default)]
    message: String,
    author: CommitAuthor,
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    raw: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    links: PullLinks,
    source: PullEndpoint,
    destination: PullEndpoint,
}

#[derive(Debug, Deserialize)]
struct PullLinks {
    html: Href,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct PullEndpoint {
    branch: BranchName,
}

#[derive(Debug, Deserialize)]
struct BranchName {
    name: String,
}

impl From<CommitResponse> for Commit {
    fn from(c: CommitResponse) -> Self {
        Commit {
            sha: c.hash,
            message: c.message,
            author: Author::parse_raw(&c.author.raw),
            date: c.date,
        }
    }
}

impl From<PullResponse> for PullRequest {
    fn from(p: PullResponse) -> Self {
        PullRequest {
            id: p.id.to_string(),
            source_branch: p.source.branch.name,
            target_branch: p.destination.branch.name,
            title: p.title,
            description: p.description.unwrap_or_default(),
            link: p.links.html.href,
        }
    }
}

/// Field names `POST /src` reads as commit metadata rather than file paths.
const FORM_FIELDS: &[&str] = &["message", "branch", "files", "author", "parents"];

/// Form field carrying the content of `path`. A root-level file named like
/// a metadata field is sent with a leading slash, which Bitbucket accepts
/// for any path.
fn content_field(path: &str) -> String {
    if FORM_FIELDS.contains(&path) {
        format!("/{}", path)
    } else {
        path.to_string()
    }
}

/// Multipart body for `POST /src`. Content fields and delete markers are
/// two disjoint collections taken from the same action list.
fn commit_form(branch: &str, actions: &[&Action], message: &str) -> Form {
    let (deletes, writes): (Vec<&Action>, Vec<&Action>) =
        actions.iter().copied().partition(|a| a.is_delete());
    let mut form = Form::new()
        .text("message", message.to_string())
        .text("branch", branch.to_string());
    for action in writes {
        form = form.text(content_field(&action.path), action.content_str().to_string());
    }
    for action in deletes {
        form = form.text("files", action.path.clone());
    }
    form
}

/// Query expression selecting pull requests by branch pair.
fn branch_pair_query(source_branch: &str, target_branch: &str) -> String {
    format!(
        "source.branch.name=\"{}\" AND destination.branch.name=\"{}\"",
        source_branch.replace('"', "\\\""),
        target_branch.replace('"', "\\\"")
    )
}

// ── Provider ──

impl BitbucketProvider {
    pub fn new(http: HttpSession, workspace: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            http,
            workspace: workspace.into(),
            repo: repo.into(),
        }
    }

    fn url(&self, tail: &[&str]) -> Url {
        let mut segments = vec!["repositories", self.workspace.as_str(), self.repo.as_str()];
        segments.extend_from_slice(tail);
        self.http.endpoint(&segments)
    }

    /// `src/<hash>/<dir>/`; the trailing slash asks for a directory listing.
    fn src_url(&self, hash: &str, dir: Option<&str>) -> Url {
        let mut segments = vec![
            "repositories",
            self.workspace.as_str(),
            self.repo.as_str(),
            "src",
            hash,
        ];
        segments.extend(dir.into_iter().flat_map(|d| d.split('/')).filter(|s| !s.is_empty()));
        segments.push("");
        self.http.endpoint(&segments)
    }

    /// Follow `next` links until the last page.
    async fn all_values<T: DeserializeOwned>(
        &self,
        first: Url,
    ) -> std::result::Result<Vec<T>, UpstreamError> {
        let mut values = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let mut page: Page<T> = self.http.json(self.http.request(Method::GET, url)).await?;
            next = page.next.as_deref().and_then(|n| Url::parse(n).ok());
            values.append(&mut page.values);
        }
        Ok(values)
    }

    async fn fetch_branch(&self, name: &str) -> std::result::Result<Option<Branch>, UpstreamError> {
        let url = self.url(&["refs", "branches", name]);
        let branch: Option<BranchResponse> = self
            .http
            .optional_json(self.http.request(Method::GET, url))
            .await?;
        Ok(branch.map(|b| Branch::new(b.name, b.target.hash)))
    }

    /// One directory level; a missing directory lists as empty.
    async fn list_dir(
        &self,
        hash: &str,
        dir: Option<&str>,
    ) -> std::result::Result<Vec<SrcEntry>, UpstreamError> {
        let mut url = self.src_url(hash, dir);
        url.query_pairs_mut().append_pair("pagelen", PAGE_LEN);
        match self.all_values(url).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_commit(&self, hash: &str) -> std::result::Result<Commit, UpstreamError> {
        let url = self.url(&["commit", hash]);
        let commit: CommitResponse = self.http.json(self.http.request(Method::GET, url)).await?;
        Ok(commit.into())
    }

    async fn push(
        &self,
        branch: &str,
        actions: &[Action],
        message: &str,
    ) -> std::result::Result<Option<Commit>, UpstreamError> {
        let Some(head) = self.fetch_branch(branch).await? else {
            return Ok(None);
        };

        let mut present = HashSet::new();
        let dirs: BTreeSet<&str> = actions
            .iter()
            .filter(|a| a.is_delete())
            .map(|a| a.path.rsplit_once('/').map_or("", |(dir, _)| dir))
            .collect();
        for dir in dirs {
            let dir = (!dir.is_empty()).then_some(dir);
            for entry in self.list_dir(&head.head_commit_id, dir).await? {
                if entry.kind == "commit_file" {
                    present.insert(entry.path);
                }
            }
        }
        let effective = effective_actions("Bitbucket", actions, &present);
        if effective.is_empty() {
            tracing::info!("Bitbucket: nothing effective to commit on {}", branch);
            return self.get_commit(&head.head_commit_id).await.map(Some);
        }

        let url = self.url(&["src"]);
        let form = commit_form(branch, &effective, message);
        self.http
            .empty(self.http.request(Method::POST, url).multipart(form))
            .await?;

        let Some(updated) = self.fetch_branch(branch).await? else {
            return Ok(None);
        };
        self.get_commit(&updated.head_commit_id).await.map(Some)
    }

    async fn search_open(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> std::result::Result<Option<PullRequest>, UpstreamError> {
        let mut url = self.url(&["pullrequests"]);
        url.query_pairs_mut()
            .append_pair("state", "OPEN")
            .append_pair("q", &branch_pair_query(source_branch, target_branch))
            .append_pair("pagelen", "50");
        let pulls: Vec<PullResponse> = self.all_values(url).await?;
        Ok(pulls
            .into_iter()
            .map(PullRequest::from)
            .find(|pr| pr.matches(source_branch, target_branch)))
    }
}

#[async_trait]
impl GitProvider for BitbucketProvider {
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
        let url = self.url(&["refs", "branches"]);
        let body = serde_json::json!({ "name": name, "target": { "hash": from_sha } });
        match self
            .http
            .json::<BranchResponse>(self.http.request(Method::POST, url).json(&body))
            .await
        {
            Ok(branch) => {
                tracing::debug!("Bitbucket: created branch {} at {}", name, from_sha);
                Ok(Branch::new(branch.name, branch.target.hash))
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
        let url = self.url(&["refs", "branches", name]);
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
        let read_err = |upstream| SubmitError::ReadFailed {
            branch: branch.name.clone(),
            path: scope.unwrap_or_default().to_string(),
            upstream,
        };
        let mut entries = Vec::new();
        let mut pending: Vec<Option<String>> = vec![scope.map(str::to_string)];
        while let Some(dir) = pending.pop() {
            let listed = self
                .list_dir(&branch.head_commit_id, dir.as_deref())
                .await
                .map_err(read_err)?;
            for entry in listed {
                match entry.kind.as_str() {
                    "commit_file" => entries.push(TreeEntry::file(entry.path)),
                    "commit_directory" => {
                        if recursive {
                            pending.push(Some(entry.path.clone()));
                        }
                        entries.push(TreeEntry::directory(entry.path));
                    }
                    _ => {}
                }
            }
        }
        tracing::debug!("Bitbucket: listed {} entries on {}", entries.len(), branch.name);
        Ok(entries)
    }

    async fn read_file(&self, branch: &Branch, path: &str) -> Result<Option<String>> {
        let mut segments = vec![
            "repositories",
            self.workspace.as_str(),
            self.repo.as_str(),
            "src",
            branch.head_commit_id.as_str(),
        ];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.http.endpoint(&segments);
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
            .push(&branch.name, actions, message)
            .await
            .map_err(|upstream| SubmitError::CommitFailed {
                branch: branch.name.clone(),
                upstream,
            })?
            .ok_or_else(|| SubmitError::BranchNotFound {
                branch: branch.name.clone(),
            })?;
        tracing::info!("Bitbucket: {} now at {}", branch.name, commit.short_sha());
        Ok(commit)
    }

    /// Bitbucket happily opens duplicates, so look before creating.
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequestCreation> {
        let failed = |upstream| SubmitError::PullRequestReconciliationFailed {
            source_branch: request.source_branch.clone(),
            target_branch: request.target_branch.clone(),
            upstream,
        };
        if self
            .search_open(&request.source_branch, &request.target_branch)
            .await
            .map_err(failed)?
            .is_some()
        {
            return Ok(PullRequestCreation::AlreadyExists);
        }

        let url = self.url(&["pullrequests"]);
        let body = serde_json::json!({
            "title": request.title,
            "description": request.description,
            "source": { "branch": { "name": request.source_branch } },
            "destination": { "branch": { "name": request.target_branch } },
        });
        let pull: PullResponse = self
            .http
            .json(self.http.request(Method::POST, url).json(&body))
            .await
            .map_err(failed)?;
        Ok(PullRequestCreation::Created(pull.into()))
    }

    async fn find_open_pull_request(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<PullRequest>> {
        self.search_open(source_branch, target_branch)
            .await
            .map_err(|upstream| SubmitError::PullRequestReconciliationFailed {
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                upstream,
            })
    }

    async fn update_pull_request(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<PullRequest> {
        let url = self.url(&["pullrequests", id]);
        let body = serde_json::json!({ "title": title, "description": description });
        let pull: PullResponse = self
            .http
            .json(self.http.request(Method::PUT, url).json(&body))
            .await
            .map_err(|upstream| SubmitError::PullRequestReconciliationFailed {
                source_branch: String::new(),
                target_branch: String::new(),
                upstream,
            })?;
        Ok(pull.into())
    }

    fn name(&self) -> &str {
        "Bitbucket"
    }
}
