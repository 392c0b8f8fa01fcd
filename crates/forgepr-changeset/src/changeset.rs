// changeset.rs — Caller intent: what each path should end up as.
//
// A ChangeSet maps paths to ChangeRequests. A request is either literal new
// content, a resolver that decides the new content from the file as it is
// on the branch right now, or a deletion. Resolvers are only ever invoked by
// the compiler, after the baseline has been read and before any write.

use std::fmt;
use std::sync::Arc;

use crate::error::ChangeSetError;
use crate::scope;

/// The current state of a file, as passed to a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Whether the file exists on the branch.
    pub exists: bool,
    /// Scope-relative path.
    pub path: String,
    /// Current content, or `""` when the file does not exist.
    pub contents: String,
}

/// Resolver signature: return the new content, or `None` to delete.
pub type ResolveFn = dyn Fn(&FileState) -> Option<String> + Send + Sync;

/// One requested change for a path.
#[derive(Clone)]
pub enum ChangeRequest {
    /// Replace (or create) the file with this content.
    Literal(String),
    /// Decide the content from the current file state.
    Resolver(Arc<ResolveFn>),
    /// Remove the file.
    Delete,
}

impl ChangeRequest {
    pub fn literal(content: impl Into<String>) -> Self {
        ChangeRequest::Literal(content.into())
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&FileState) -> Option<String> + Send + Sync + 'static,
    {
        ChangeRequest::Resolver(Arc::new(f))
    }

    /// Resolve this request against a file state.
    ///
    /// `None` means the file should be deleted.
    pub fn resolve(&self, state: &FileState) -> Option<String> {
        match self {
            ChangeRequest::Literal(content) => Some(content.clone()),
            ChangeRequest::Resolver(f) => f(state),
            ChangeRequest::Delete => None,
        }
    }
}

impl fmt::Debug for ChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRequest::Literal(content) => {
                f.debug_tuple("Literal").field(&content.len()).finish()
            }
            ChangeRequest::Resolver(_) => f.write_str("Resolver(..)"),
            ChangeRequest::Delete => f.write_str("Delete"),
        }
    }
}

impl From<&str> for ChangeRequest {
    fn from(content: &str) -> Self {
        ChangeRequest::Literal(content.to_string())
    }
}

impl From<String> for ChangeRequest {
    fn from(content: String) -> Self {
        ChangeRequest::Literal(content)
    }
}

impl From<Option<String>> for ChangeRequest {
    fn from(content: Option<String>) -> Self {
        content.map_or(ChangeRequest::Delete, ChangeRequest::Literal)
    }
}

/// Insertion-ordered map of scope-relative path → ChangeRequest.
///
/// Paths are unique. Inserting an existing path replaces its request but
/// keeps its original position, so the compiled action list stays
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: Vec<(String, ChangeRequest)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a changeset from `(path, request)` pairs.
    pub fn try_from_iter<I, P, R>(iter: I) -> Result<Self, ChangeSetError>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<ChangeRequest>,
    {
        let mut changes = Self::new();
        for (path, request) in iter {
            changes.insert(path.as_ref(), request)?;
        }
        Ok(changes)
    }

    /// Add or replace the request for `path`.
    pub fn insert(
        &mut self,
        path: &str,
        request: impl Into<ChangeRequest>,
    ) -> Result<(), ChangeSetError> {
        let path = scope::normalize_path(path)?;
        let request = request.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = request,
            None => self.entries.push((path, request)),
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ChangeRequest> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, r)| r)
    }

    /// Paths in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChangeRequest)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
