// error.rs — Error taxonomy for reconcile operations.
//
// Every failure carries the branch/path/operation it happened on and, when
// a provider was involved, the upstream HTTP status and message. Nothing is
// retried here; retry policy belongs to the caller.

use thiserror::Error;

/// What a provider said when a request failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct UpstreamError {
    /// Provider operation, e.g. `"POST /git/refs"`.
    pub operation: String,
    /// HTTP status, or `None` for transport-level failures.
    pub status: Option<u16>,
    /// Response body or transport error text.
    pub message: String,
}

impl UpstreamError {
    pub fn new(operation: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// A failure that never reached the provider (connection, TLS, decode).
    pub fn transport(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::new(operation, None, err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn has_status(&self, status: u16) -> bool {
        self.status == Some(status)
    }

    /// Case-insensitive substring check against the upstream message.
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Errors that can occur during a reconcile.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Missing credential, unparseable repository URL or unknown provider.
    #[error("setup failed: {0}")]
    SetupFailed(String),

    /// The branch does not exist.
    #[error("branch '{branch}' not found")]
    BranchNotFound { branch: String },

    /// Creation was requested for a branch that already exists.
    #[error("branch '{branch}' already exists")]
    BranchAlreadyExists { branch: String },

    /// Transport or provider failure while resolving, creating or deleting a branch.
    #[error("branch {operation} failed for '{branch}': {upstream}")]
    BranchOperationFailed {
        branch: String,
        operation: &'static str,
        upstream: UpstreamError,
    },

    /// Listing or content fetch failed for a reason other than a benign 404.
    #[error("read of '{path}' on '{branch}' failed: {upstream}")]
    ReadFailed {
        branch: String,
        path: String,
        upstream: UpstreamError,
    },

    /// The commit transaction failed.
    #[error("commit to '{branch}' failed: {upstream}")]
    CommitFailed {
        branch: String,
        upstream: UpstreamError,
    },

    /// Pull request creation and the fallback search/update both failed.
    #[error("pull request reconciliation for '{source_branch}' -> '{target_branch}' failed: {upstream}")]
    PullRequestReconciliationFailed {
        source_branch: String,
        target_branch: String,
        upstream: UpstreamError,
    },

    /// The changeset itself was invalid.
    #[error("invalid changeset: {0}")]
    ChangeSet(#[from] forgepr_changeset::ChangeSetError),
}

pub type Result<T> = std::result::Result<T, SubmitError>;

impl SubmitError {
    /// The upstream detail, when a provider was involved.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            SubmitError::BranchOperationFailed { upstream, .. }
            | SubmitError::ReadFailed { upstream, .. }
            | SubmitError::CommitFailed { upstream, .. }
            | SubmitError::PullRequestReconciliationFailed { upstream, .. } => Some(upstream),
            _ => None,
        }
    }
}
