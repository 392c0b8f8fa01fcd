//! Workflow configuration structures

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SubmitError;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = ".forgepr.toml";

/// Top-level configuration from .forgepr.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForgeConfig {
    /// Provider and repository configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Defaults for reconcile runs
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Supported hosting providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Gitlab,
    Bitbucket,
}

impl ProviderKind {
    /// Infer the provider from a repository host name.
    pub fn detect(host: &str) -> Option<Self> {
        let host = host.to_lowercase();
        if host == "github.com" || host.starts_with("github.") {
            Some(ProviderKind::Github)
        } else if host.contains("gitlab") {
            Some(ProviderKind::Gitlab)
        } else if host.contains("bitbucket") {
            Some(ProviderKind::Bitbucket)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Gitlab => "gitlab",
            ProviderKind::Bitbucket => "bitbucket",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(ProviderKind::Github),
            "gitlab" => Ok(ProviderKind::Gitlab),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            other => Err(SubmitError::SetupFailed(format!(
                "unknown provider '{}' (expected github, gitlab or bitbucket)",
                other
            ))),
        }
    }
}

/// Provider connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Provider type; inferred from the repository host when omitted
    pub kind: Option<ProviderKind>,

    /// Repository clone or browser URL
    #[serde(default)]
    pub repository: String,

    /// API base URL override (self-hosted GitLab, GitHub Enterprise, tests)
    pub api_base: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: None,
            repository: String::new(),
            api_base: None,
            token_env: default_token_env(),
        }
    }
}

impl ProviderConfig {
    /// Read the token from the configured environment variable.
    pub fn token_from_env(&self) -> Result<String, SubmitError> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(SubmitError::SetupFailed(format!(
                "no token found in environment variable {}",
                self.token_env
            ))),
        }
    }
}

/// Reconcile defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    /// Target branch for pull requests (e.g., "main", "develop")
    #[serde(default = "default_target_branch")]
    pub target_branch: String,

    /// Prefix added to source branch names that don't already carry it
    #[serde(default)]
    pub branch_prefix: String,

    /// Delete and recreate the source branch from the target on every run
    #[serde(default)]
    pub reset_source_branch: bool,

    /// Subtree all reads and writes are scoped to
    pub scope_path: Option<String>,

    /// Path to PR description template (optional)
    pub pr_template: Option<PathBuf>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            target_branch: default_target_branch(),
            branch_prefix: String::new(),
            reset_source_branch: false,
            scope_path: None,
            pr_template: None,
        }
    }
}

impl ReconcileConfig {
    /// Apply the branch prefix unless the name already starts with it.
    pub fn source_branch_name(&self, name: &str) -> String {
        if self.branch_prefix.is_empty() || name.starts_with(&self.branch_prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.branch_prefix, name)
        }
    }
}

// Serde default functions
fn default_token_env() -> String {
    "FORGEPR_TOKEN".to_string()
}

fn default_target_branch() -> String {
    "main".to_string()
}

impl ForgeConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, SubmitError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SubmitError::SetupFailed(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            SubmitError::SetupFailed(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Try to load config, returning default if file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self, SubmitError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize back to TOML (used by `forgepr config init`).
    pub fn to_toml(&self) -> Result<String, SubmitError> {
        toml::to_string_pretty(self)
            .map_err(|e| SubmitError::SetupFailed(format!("cannot serialize config: {}", e)))
    }
}
