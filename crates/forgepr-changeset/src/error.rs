// error.rs — Error types for the changeset subsystem.

use thiserror::Error;

/// Errors that can occur while building a changeset.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeSetError {
    /// The path is empty after normalization.
    #[error("empty path")]
    EmptyPath,

    /// The path is absolute; changes are always relative to the repository root or scope.
    #[error("absolute path not allowed: '{0}'")]
    AbsolutePath(String),

    /// The path tries to escape its scope with `..`.
    #[error("path traversal detected: '{0}'")]
    PathTraversal(String),
}
