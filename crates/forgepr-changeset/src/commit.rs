// commit.rs — Repository state as providers report it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named branch and the commit it currently points to.
///
/// Identity is `name`; `head_commit_id` advances on every commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub head_commit_id: String,
}

impl Branch {
    pub fn new(name: impl Into<String>, head_commit_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head_commit_id: head_commit_id.into(),
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Parse a git-style `Name <email>` string.
    ///
    /// Strings without an email part keep everything as the name.
    pub fn parse_raw(raw: &str) -> Self {
        match (raw.find('<'), raw.rfind('>')) {
            (Some(open), Some(close)) if open < close => Self {
                name: raw[..open].trim().to_string(),
                email: raw[open + 1..close].trim().to_string(),
            },
            _ => Self {
                name: raw.trim().to_string(),
                email: String::new(),
            },
        }
    }
}

/// An immutable commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: Author,
    pub date: DateTime<Utc>,
}

impl Commit {
    /// First 8 characters of the sha, for log lines.
    pub fn short_sha(&self) -> &str {
        self.sha.get(..8).unwrap_or(&self.sha)
    }
}

/// A file as seen by the Tree Reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Scope-relative, slash-separated path.
    pub path: String,
    pub content: String,
    pub exists: bool,
}
