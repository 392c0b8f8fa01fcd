pub mod branch;
pub mod config;
pub mod read;
pub mod reconcile;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use forgepr_submit::{ForgeConfig, GitProvider};

/// Loaded configuration plus the project root it is relative to.
pub struct Context {
    pub project_root: PathBuf,
    pub config: ForgeConfig,
}

impl Context {
    pub fn load(project_root: PathBuf, config_path: &Path) -> anyhow::Result<Self> {
        let config = ForgeConfig::load_or_default(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        Ok(Self {
            project_root,
            config,
        })
    }

    /// Authenticated provider for the configured repository.
    pub fn connect(&self) -> anyhow::Result<Box<dyn GitProvider>> {
        let provider = &self.config.provider;
        if provider.repository.trim().is_empty() {
            anyhow::bail!(
                "No repository configured. Set provider.repository in {} (see `forgepr config init`).",
                forgepr_submit::CONFIG_FILE_NAME
            );
        }
        let token = provider.token_from_env()?;
        Ok(forgepr_submit::connect(provider, &token)?)
    }

    /// Resolve a path from the config file against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Split a `path=value` argument at the first `=`.
pub fn parse_assignment(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((path, value)) if !path.trim().is_empty() => {
            Ok((path.trim().to_string(), value.to_string()))
        }
        _ => anyhow::bail!("expected PATH=VALUE, got '{}'", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_at_first_equals() {
        assert_eq!(
            parse_assignment("cfg.env=KEY=value").unwrap(),
            ("cfg.env".to_string(), "KEY=value".to_string())
        );
        assert_eq!(
            parse_assignment("empty.txt=").unwrap(),
            ("empty.txt".to_string(), String::new())
        );
    }

    #[test]
    fn assignment_without_path_is_rejected() {
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("no-equals").is_err());
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::load(dir.path().to_path_buf(), &dir.path().join(".forgepr.toml")).unwrap();
        assert_eq!(ctx.config.reconcile.target_branch, "main");
        assert!(ctx.connect().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_project_root() {
        let ctx = Context {
            project_root: PathBuf::from("/work/repo"),
            config: ForgeConfig::default(),
        };
        assert_eq!(
            ctx.resolve(Path::new(".forgepr/pr.md")),
            PathBuf::from("/work/repo/.forgepr/pr.md")
        );
    }
}
