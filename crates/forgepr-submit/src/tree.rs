// tree.rs — Tree Reader: baseline file state for a scope on a branch head.
//
// Listing and filtering happen before any content is fetched:
//   1. provider listing (every page, under the scope)
//   2. keep files only, strip the scope prefix
//   3. non-recursive reads keep direct children only
//   4. an explicit file list projects the result
// Content for the surviving paths is then fetched concurrently, bounded by
// MAX_CONCURRENT_FETCHES, and joined before anything is returned. A file
// that disappears between listing and fetch (404) is dropped, not an error.

use std::collections::{BTreeMap, BTreeSet};

use forgepr_changeset::{scope, Branch, FileEntry};
use futures::{StreamExt, TryStreamExt};

use crate::error::Result;
use crate::provider::GitProvider;

/// Upper bound on in-flight content fetches per read.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

/// What to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Subtree to read; repository root when `None`.
    pub scope_path: Option<String>,
    /// Scope-relative paths to keep; every file when `None`.
    pub specific_files: Option<Vec<String>>,
    /// Include files in subdirectories of the scope.
    pub recursive: bool,
}

impl ReadOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope_path: Option<&str>) -> Self {
        self.scope_path = scope_path.map(str::to_string);
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specific_files = Some(files.into_iter().map(Into::into).collect());
        self
    }
}

/// Read files on `branch`, returning scope-relative path → content.
pub async fn list(
    provider: &dyn GitProvider,
    branch: &Branch,
    options: &ReadOptions,
) -> Result<BTreeMap<String, String>> {
    let scope_path = scope::normalize_scope(options.scope_path.as_deref());
    let scope_path = scope_path.as_deref();
    let wanted: Option<BTreeSet<String>> = options.specific_files.as_ref().map(|files| {
        files
            .iter()
            .filter_map(|f| scope::normalize_path(f).ok())
            .collect()
    });

    let entries = provider
        .list_tree(branch, scope_path, options.recursive)
        .await?;
    let listed = entries.len();

    let selected: BTreeSet<String> = entries
        .iter()
        .filter(|entry| entry.is_file())
        .filter_map(|entry| scope::strip(scope_path, &entry.path))
        .filter(|relative| options.recursive || scope::is_direct_child(relative))
        .filter(|relative| wanted.as_ref().map_or(true, |w| w.contains(*relative)))
        .map(str::to_string)
        .collect();

    tracing::debug!(
        "{}: {} of {} listed entries selected on {} (scope: {})",
        provider.name(),
        selected.len(),
        listed,
        branch.name,
        scope_path.unwrap_or("/")
    );

    let fetched: Vec<(String, Option<String>)> = futures::stream::iter(selected)
        .map(|relative| async move {
            let full_path = scope::join(scope_path, &relative);
            let content = provider.read_file(branch, &full_path).await?;
            Ok::<_, crate::error::SubmitError>((relative, content))
        })
        .buffered(MAX_CONCURRENT_FETCHES)
        .try_collect()
        .await?;

    Ok(fetched
        .into_iter()
        .filter_map(|(relative, content)| match content {
            Some(content) => Some((relative, content)),
            None => {
                tracing::warn!(
                    "{}: {} vanished between listing and fetch on {}; treating as absent",
                    provider.name(),
                    relative,
                    branch.name
                );
                None
            }
        })
        .collect())
}

/// Like [`list`], but returns [`FileEntry`] values. When specific files are
/// requested, files that are absent are reported with `exists: false`.
pub async fn entries(
    provider: &dyn GitProvider,
    branch: &Branch,
    options: &ReadOptions,
) -> Result<Vec<FileEntry>> {
    let mut files = list(provider, branch, options).await?;
    let mut result: Vec<FileEntry> = Vec::new();
    if let Some(wanted) = &options.specific_files {
        for path in wanted.iter().filter_map(|f| scope::normalize_path(f).ok()) {
            if result.iter().any(|e| e.path == path) {
                continue;
            }
            let content = files.remove(&path);
            result.push(FileEntry {
                exists: content.is_some(),
                content: content.unwrap_or_default(),
                path,
            });
        }
    }
    result.extend(files.into_iter().map(|(path, content)| FileEntry {
        path,
        content,
        exists: true,
    }));
    Ok(result)
}
