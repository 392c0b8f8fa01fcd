//! Built-in providers and provider selection.
//!
//! [`connect`] is the only place a provider session is created: it parses the
//! repository URL, picks the provider kind (explicit or inferred from the
//! host), resolves the API base and returns a boxed [`GitProvider`].

pub mod bitbucket;
pub mod github;
pub mod gitlab;
pub mod memory;

use std::collections::HashSet;

use forgepr_changeset::Action;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Result, SubmitError};
use crate::http::HttpSession;
use crate::provider::GitProvider;
use crate::repo_url::RepoUrl;

pub use bitbucket::BitbucketProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use memory::MemoryProvider;

/// Create an authenticated provider session for the configured repository.
pub fn connect(config: &ProviderConfig, token: &str) -> Result<Box<dyn GitProvider>> {
    let url = RepoUrl::parse(&config.repository)?;
    let kind = match config.kind {
        Some(kind) => kind,
        None => ProviderKind::detect(&url.host).ok_or_else(|| {
            SubmitError::SetupFailed(format!(
                "cannot infer provider from host '{}'; set provider.kind",
                url.host
            ))
        })?,
    };
    let api_base = match &config.api_base {
        Some(base) => base.clone(),
        None => default_api_base(kind, &url.host),
    };
    let http = HttpSession::new(&api_base, token)?;

    tracing::info!(
        "connecting to {} repository {} via {}",
        kind,
        url.full_path(),
        api_base
    );

    Ok(match kind {
        ProviderKind::Github => {
            let (owner, repo) = url.owner_and_name()?;
            Box::new(GitHubProvider::new(http, owner, repo))
        }
        ProviderKind::Gitlab => Box::new(GitLabProvider::new(http, url.full_path())),
        ProviderKind::Bitbucket => {
            let (workspace, repo) = url.owner_and_name()?;
            Box::new(BitbucketProvider::new(http, workspace, repo))
        }
    })
}

/// API base used when the configuration does not override it.
pub fn default_api_base(kind: ProviderKind, host: &str) -> String {
    match kind {
        ProviderKind::Github if host == "github.com" => "https://api.github.com".to_string(),
        ProviderKind::Github => format!("https://{}/api/v3", host),
        ProviderKind::Gitlab => format!("https://{}/api/v4", host),
        ProviderKind::Bitbucket => "https://api.bitbucket.org/2.0".to_string(),
    }
}

/// Drop deletes of paths that are not in `present`.
///
/// Every other action is kept in order.
pub(crate) fn effective_actions<'a>(
    provider: &str,
    actions: &'a [Action],
    present: &HashSet<String>,
) -> Vec<&'a Action> {
    actions
        .iter()
        .filter(|action| {
            let keep = !action.is_delete() || present.contains(&action.path);
            if !keep {
                tracing::debug!("{}: skipping delete of absent {}", provider, action.path);
            }
            keep
        })
        .collect()
}
