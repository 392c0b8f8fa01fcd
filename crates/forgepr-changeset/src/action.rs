// action.rs — Normalized write instructions.
//
// An Action is what the compiler hands to a provider's commit transaction:
// a full repository path, what to do with it, and (for create/update) the
// whole new file content. Diffs are never modeled; every write replaces the
// file.

use serde::{Deserialize, Serialize};

/// What a single action does to its path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The path did not exist in the baseline; the file is created.
    Create,
    /// The path existed in the baseline; its content is replaced.
    Update,
    /// The path is removed. Removing an absent path is a no-op.
    Delete,
}

impl ActionKind {
    /// Lowercase verb as used in provider payloads and PR descriptions.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One normalized create/update/delete instruction.
///
/// Invariant: `content` is `None` exactly when `kind` is [`ActionKind::Delete`].
/// Use the constructors to keep it that way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    /// Full repository path (scope prefix already applied).
    pub path: String,

    /// What to do with the path.
    pub kind: ActionKind,

    /// New file content for create/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Action {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ActionKind::Create,
            content: Some(content.into()),
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ActionKind::Update,
            content: Some(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ActionKind::Delete,
            content: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ActionKind::Delete
    }

    /// Content to write, or `""` for deletes.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}
