// pull_request.rs — PR Reconciler: create, or update the one that exists.
//
// Creation is always attempted first. When the provider reports that an
// open request already exists for the (source, target) pair, the first
// matching open request is looked up and its title/description replaced.
// Repeated reconciles therefore converge on a single open request.

use forgepr_changeset::{Action, PullRequest};
use regex::{Captures, Regex};

use crate::error::{Result, SubmitError, UpstreamError};
use crate::provider::{GitProvider, NewPullRequest, PullRequestCreation};

/// Create a pull request for `source → target`, or update the existing one.
pub async fn create_or_update(
    provider: &dyn GitProvider,
    source_branch: &str,
    target_branch: &str,
    title: &str,
    description: &str,
) -> Result<PullRequest> {
    let request = NewPullRequest {
        source_branch: source_branch.to_string(),
        target_branch: target_branch.to_string(),
        title: title.to_string(),
        description: description.to_string(),
    };

    match provider.create_pull_request(&request).await? {
        PullRequestCreation::Created(pr) => {
            tracing::info!("{}: created pull request {} ({})", provider.name(), pr.id, pr.link);
            Ok(pr)
        }
        PullRequestCreation::AlreadyExists => {
            tracing::info!(
                "{}: pull request for {} -> {} already open, updating it",
                provider.name(),
                source_branch,
                target_branch
            );
            let existing = provider
                .find_open_pull_request(source_branch, target_branch)
                .await
                .map_err(|e| reconciliation_failed(e, source_branch, target_branch))?
                .ok_or_else(|| SubmitError::PullRequestReconciliationFailed {
                    source_branch: source_branch.to_string(),
                    target_branch: target_branch.to_string(),
                    upstream: UpstreamError::new(
                        "search open pull requests",
                        None,
                        "provider reported an open pull request but none matched the branch pair",
                    ),
                })?;
            let updated = provider
                .update_pull_request(&existing.id, title, description)
                .await
                .map_err(|e| reconciliation_failed(e, source_branch, target_branch))?;
            tracing::info!("{}: updated pull request {} ({})", provider.name(), updated.id, updated.link);
            Ok(updated)
        }
    }
}

/// Normalize fallback failures to `PullRequestReconciliationFailed`.
fn reconciliation_failed(err: SubmitError, source_branch: &str, target_branch: &str) -> SubmitError {
    match err {
        SubmitError::PullRequestReconciliationFailed { upstream, .. } => {
            SubmitError::PullRequestReconciliationFailed {
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                upstream,
            }
        }
        other => {
            let upstream = other
                .upstream()
                .cloned()
                .unwrap_or_else(|| UpstreamError::new("pull request fallback", None, other.to_string()));
            SubmitError::PullRequestReconciliationFailed {
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                upstream,
            }
        }
    }
}

const PLACEHOLDER: &str = r"\{(title|source|target|change_count|changes)\}";

/// Values available to a description template.
#[derive(Debug, Clone, Copy)]
pub struct DescriptionContext<'a> {
    pub title: &'a str,
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub actions: &'a [Action],
}

/// Substitute template variables in one pass, so values that themselves
/// look like `{variable}` are left alone. Unknown `{…}` text is kept.
///
/// Available variables:
///   {title}        — pull request title
///   {source}       — source branch
///   {target}       — target branch
///   {change_count} — number of actions
///   {changes}      — one line per action: "- create `path`"
pub fn render_description(template: &str, ctx: &DescriptionContext<'_>) -> String {
    let Ok(placeholder) = Regex::new(PLACEHOLDER) else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "title" => ctx.title.to_string(),
            "source" => ctx.source_branch.to_string(),
            "target" => ctx.target_branch.to_string(),
            "change_count" => ctx.actions.len().to_string(),
            "changes" => ctx
                .actions
                .iter()
                .map(|a| format!("- {} `{}`", a.kind, a.path))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::MemoryProvider;

    async fn provider_with_feature() -> MemoryProvider {
        let provider = MemoryProvider::new().with_branch("main", [("a.txt", "a")]);
        let head = provider.head("main").unwrap();
        provider.create_branch("feature", &head).await.unwrap();
        provider
    }

    #[tokio::test]
    async fn creates_when_none_open() {
        let provider = provider_with_feature().await;
        let pr = create_or_update(&provider, "feature", "main", "Title", "Body")
            .await
            .unwrap();
        assert_eq!(pr.title, "Title");
        assert_eq!(provider.open_pull_requests().len(), 1);
    }

    #[tokio::test]
    async fn second_call_updates_instead_of_duplicating() {
        let provider = provider_with_feature().await;
        let first = create_or_update(&provider, "feature", "main", "v1", "first")
            .await
            .unwrap();
        let second = create_or_update(&provider, "feature", "main", "v2", "second")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let open = provider.open_pull_requests();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "v2");
        assert_eq!(open[0].description, "second");
    }

    #[tokio::test]
    async fn closed_request_does_not_block_a_new_one() {
        let provider = provider_with_feature().await;
        let first = create_or_update(&provider, "feature", "main", "v1", "").await.unwrap();
        provider.close_pull_request(&first.id);

        let second = create_or_update(&provider, "feature", "main", "v2", "").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn failed_fallback_update_is_reconciliation_failure() {
        let provider = provider_with_feature().await;
        create_or_update(&provider, "feature", "main", "v1", "").await.unwrap();
        provider.fail_on("update_pull_request");

        let err = create_or_update(&provider, "feature", "main", "v2", "")
            .await
            .unwrap_err();
        match err {
            SubmitError::PullRequestReconciliationFailed {
                source_branch,
                target_branch,
                upstream,
            } => {
                assert_eq!(source_branch, "feature");
                assert_eq!(target_branch, "main");
                assert_eq!(upstream.status, Some(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn template_substitution() {
        let actions = vec![Action::create("a.txt", "x"), Action::delete("b.txt")];
        let ctx = DescriptionContext {
            title: "Bump",
            source_branch: "bot/bump",
            target_branch: "main",
            actions: &actions,
        };
        let rendered = render_description("{title}: {source} -> {target} ({change_count})\n{changes}", &ctx);
        assert_eq!(
            rendered,
            "Bump: bot/bump -> main (2)\n- create `a.txt`\n- delete `b.txt`"
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let ctx = DescriptionContext {
            title: "Literal {source} in title",
            source_branch: "feature",
            target_branch: "main",
            actions: &[],
        };
        assert_eq!(
            render_description("{title} / {unknown}", &ctx),
            "Literal {source} in title / {unknown}"
        );
    }
}
