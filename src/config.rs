use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entity::Entity;
use crate::migrator_config::{CONFIG_FILE_NAME, MigratorToml};
use crate::record::StoreOptions;
use crate::retry::RetryPolicy;

/// Name of the per-project working directory.
pub const MIGRATOR_DIR: &str = ".migrator";

/// Runtime configuration for a migrator invocation.
///
/// Bridges the parsed `migrator.toml` with CLI flags and resolves every path
/// the commands touch.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub migrator_dir: PathBuf,
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub work_dir: PathBuf,
    pub verbose: bool,
    /// Auto-confirm reuse of empty destinations
    pub yes: bool,
    pub toml: MigratorToml,
}

impl Config {
    /// Resolve paths under `project_dir` and load the configuration file.
    ///
    /// `config_file` overrides the default `.migrator/migrator.toml`; an
    /// explicit file must exist, the default one may be absent.
    pub fn new(
        project_dir: PathBuf,
        config_file: Option<PathBuf>,
        verbose: bool,
        yes: bool,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let migrator_dir = project_dir.join(MIGRATOR_DIR);

        let (config_file, toml) = match config_file {
            Some(path) => {
                let toml = MigratorToml::load(&path)?;
                (path, toml)
            }
            None => (
                migrator_dir.join(CONFIG_FILE_NAME),
                MigratorToml::load_or_default(&migrator_dir)?,
            ),
        };

        Ok(Self {
            state_file: migrator_dir.join("state.json"),
            backup_dir: migrator_dir.join("backups"),
            log_dir: migrator_dir.join("logs"),
            work_dir: migrator_dir.join("work"),
            project_dir,
            migrator_dir,
            config_file,
            verbose,
            yes,
            toml,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.migrator_dir)
            .context("Failed to create .migrator directory")?;
        std::fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(&self.work_dir).context("Failed to create work directory")?;
        Ok(())
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.toml.entities()
    }

    /// Destination organization, required for any run.
    pub fn org(&self) -> Result<String> {
        self.toml.org().ok_or_else(|| {
            anyhow!("No destination organization configured. Set [destination] org in migrator.toml or MIGRATOR_ORG")
        })
    }

    /// Token from the environment variable named by `token_env`.
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.toml.destination.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.toml.retry_policy()
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            debounce: Duration::from_millis(self.toml.migration.save_debounce_ms),
            backup_retention: self.toml.migration.backup_retention,
            backup_dir: Some(self.backup_dir.clone()),
        }
    }

    pub fn git_cmd(&self) -> String {
        self.toml.git_cmd()
    }

    /// Entities restricted to `only`, keeping configuration order.
    ///
    /// Names that are not configured are an error.
    pub fn select_entities(&self, only: &[String]) -> Result<Vec<Entity>> {
        let entities = self.entities();
        if only.is_empty() {
            return Ok(entities);
        }

        let unknown: Vec<&str> = only
            .iter()
            .filter(|name| !entities.iter().any(|e| &e.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(anyhow!(
                "Unknown repositories: {}. Run `repo-migrator list` to see configured names",
                unknown.join(", ")
            ));
        }

        Ok(entities
            .into_iter()
            .filter(|e| only.contains(&e.name))
            .collect())
    }

    pub fn relative_to_project<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_dir).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, content: &str) {
        let migrator_dir = dir.join(MIGRATOR_DIR);
        fs::create_dir_all(&migrator_dir).unwrap();
        fs::write(migrator_dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    const CONFIG: &str = r#"
[source]
base_url = "https://git.example.com/team"

[destination]
org = "acme"
token_env = "MIGRATOR_TEST_TOKEN_UNSET"

[migration]
save_debounce_ms = 250
backup_retention = 3

[[repositories]]
name = "alpha"

[[repositories]]
name = "beta"

[[repositories]]
name = "gamma"
"#;

    #[test]
    fn test_config_paths_in_migrator_directory() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), None, false, false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.migrator_dir, root.join(".migrator"));
        assert_eq!(config.state_file, root.join(".migrator/state.json"));
        assert_eq!(config.config_file, root.join(".migrator/migrator.toml"));
        assert_eq!(config.log_dir, root.join(".migrator/logs"));
        assert!(config.entities().is_empty());
    }

    #[test]
    fn test_config_loads_repositories() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), CONFIG);
        let config = Config::new(dir.path().to_path_buf(), None, true, true).unwrap();
        assert!(config.verbose);
        assert!(config.yes);
        let names: Vec<String> = config.entities().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        let options = config.store_options();
        assert_eq!(options.debounce, Duration::from_millis(250));
        assert_eq!(options.backup_retention, 3);
        assert_eq!(options.backup_dir, Some(config.backup_dir.clone()));
        assert!(config.github_token().is_none());
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nowhere.toml");
        let result = Config::new(dir.path().to_path_buf(), Some(missing), false, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_select_entities_keeps_configuration_order() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), CONFIG);
        let config = Config::new(dir.path().to_path_buf(), None, false, false).unwrap();

        let selected = config
            .select_entities(&["gamma".to_string(), "alpha".to_string()])
            .unwrap();
        let names: Vec<&str> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "gamma"]);

        assert_eq!(config.select_entities(&[]).unwrap().len(), 3);

        let err = config.select_entities(&["delta".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Unknown repositories: delta"));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), None, false, false).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.backup_dir.exists());
        assert!(config.log_dir.exists());
        assert!(config.work_dir.exists());
    }
}
