// config.rs — Config subcommands: init, show.

use std::fs;
use std::path::Path;

use clap::Subcommand;
use forgepr_submit::ForgeConfig;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a starter configuration file.
    Init {
        /// Repository URL to put in provider.repository.
        #[arg(long)]
        repository: Option<String>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

pub fn execute(cmd: &ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Init { repository, force } => {
            init(config_path, repository.as_deref(), *force)
        }
        ConfigCommands::Show => {
            let config = ForgeConfig::load_or_default(config_path)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init(config_path: &Path, repository: Option<&str>, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        println!("  {} already exists — skipping (use --force to overwrite)", config_path.display());
        return Ok(());
    }
    let mut config = ForgeConfig::default();
    if let Some(repository) = repository {
        config.provider.repository = repository.to_string();
    }
    let body = format!(
        "# forgepr configuration\n#\n# The bearer token is read from the environment variable named by\n# provider.token_env; it is never stored here.\n\n{}",
        config.to_toml()?
    );
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, body)?;
    println!("  Created {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".forgepr.toml");
        init(&path, Some("https://gitlab.com/acme/widgets"), false).unwrap();

        let config = ForgeConfig::load(&path).unwrap();
        assert_eq!(config.provider.repository, "https://gitlab.com/acme/widgets");
        assert_eq!(config.provider.token_env, "FORGEPR_TOKEN");
        assert_eq!(config.reconcile.target_branch, "main");
    }

    #[test]
    fn init_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".forgepr.toml");
        fs::write(&path, "# mine\n").unwrap();

        init(&path, None, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");

        init(&path, None, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[provider]"));
    }
}
