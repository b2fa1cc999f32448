//! Migration configuration read from `.migrator/migrator.toml`.
//!
//! Settings are layered file → environment → CLI. The file lists the
//! repositories to migrate and how to reach both sides:
//!
//! ```toml
//! [source]
//! base_url = "https://git.example.com/scm/team"
//!
//! [destination]
//! api_url = "https://api.github.com"
//! git_url = "https://github.com"
//! org = "acme"
//! token_env = "GITHUB_TOKEN"
//! private = true
//!
//! [migration]
//! empty_destination = "prompt"
//! save_debounce_ms = 2000
//! backup_retention = 5
//! git_cmd = "git"
//! keep_local = false
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_ms = 8000
//!
//! [retry.max_retries]
//! network = 3
//!
//! [logging]
//! json = false
//!
//! [[repositories]]
//! name = "svc-a"
//! description = "Service A"
//! source = "https://git.example.com/scm/team/svc-a.git"
//! ```

use crate::classify::ErrorCategory;
use crate::entity::Entity;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "migrator.toml";

static REPOSITORY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+$").expect("repository name pattern is a valid regex")
});

/// What to do when the destination already exists but holds nothing.
///
/// | Policy   | Behavior                                                  |
/// |----------|-----------------------------------------------------------|
/// | `Prompt` | Ask the operator; `--yes` accepts, no terminal declines   |
/// | `Reuse`  | Adopt the empty destination as created                    |
/// | `Abort`  | Fail the repository as a validation error                 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyDestinationPolicy {
    #[default]
    Prompt,
    Reuse,
    Abort,
}

impl std::fmt::Display for EmptyDestinationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyDestinationPolicy::Prompt => write!(f, "prompt"),
            EmptyDestinationPolicy::Reuse => write!(f, "reuse"),
            EmptyDestinationPolicy::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for EmptyDestinationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prompt" => Ok(EmptyDestinationPolicy::Prompt),
            "reuse" => Ok(EmptyDestinationPolicy::Reuse),
            "abort" => Ok(EmptyDestinationPolicy::Abort),
            _ => anyhow::bail!(
                "Invalid empty destination policy '{}'. Valid values: prompt, reuse, abort",
                s
            ),
        }
    }
}

/// Where repositories come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    /// Repositories without an explicit `source` resolve to `{base_url}/{name}.git`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Where repositories go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_git_url")]
    pub git_url: String,
    /// Organization that receives the repositories (the destination group)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Environment variable holding the API and push token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_private")]
    pub private: bool,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_git_url() -> String {
    "https://github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_private() -> bool {
    true
}

impl Default for DestinationSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            git_url: default_git_url(),
            org: None,
            token_env: default_token_env(),
            private: default_private(),
        }
    }
}

/// Run behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSection {
    #[serde(default)]
    pub empty_destination: EmptyDestinationPolicy,
    /// Window in which record changes collapse into one state file write
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    /// State file backups to keep
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_cmd: Option<String>,
    /// Keep local mirrors after verification
    #[serde(default)]
    pub keep_local: bool,
}

fn default_save_debounce_ms() -> u64 {
    2000
}

fn default_backup_retention() -> usize {
    5
}

impl Default for MigrationSection {
    fn default() -> Self {
        Self {
            empty_destination: EmptyDestinationPolicy::default(),
            save_debounce_ms: default_save_debounce_ms(),
            backup_retention: default_backup_retention(),
            git_cmd: None,
            keep_local: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-category overrides keyed by category name (e.g. `network = 5`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max_retries: BTreeMap<String, u32>,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Write the log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

/// One repository to migrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The complete migrator.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigratorToml {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub destination: DestinationSection,
    #[serde(default)]
    pub migration: MigrationSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

impl MigratorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse migrator.toml")
    }

    /// Load `migrator.toml` from `migrator_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(migrator_dir: &Path) -> Result<Self> {
        let config_path = migrator_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize migrator.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Starter configuration written by `config init`.
    pub fn template() -> Self {
        Self {
            source: SourceSection {
                base_url: Some("https://git.example.com/scm/team".to_string()),
            },
            destination: DestinationSection {
                org: Some("my-org".to_string()),
                ..DestinationSection::default()
            },
            repositories: vec![RepositoryEntry {
                name: "example-service".to_string(),
                description: "Example service".to_string(),
                source: None,
            }],
            ..Self::default()
        }
    }

    /// Git command (file → env → default).
    pub fn git_cmd(&self) -> String {
        self.migration
            .git_cmd
            .clone()
            .or_else(|| std::env::var("MIGRATOR_GIT_CMD").ok())
            .unwrap_or_else(|| "git".to_string())
    }

    /// Destination organization (env overrides file).
    pub fn org(&self) -> Option<String> {
        std::env::var("MIGRATOR_ORG")
            .ok()
            .filter(|org| !org.trim().is_empty())
            .or_else(|| self.destination.org.clone())
    }

    /// Resolve where a repository is fetched from.
    pub fn source_for(&self, entry: &RepositoryEntry) -> Option<String> {
        if let Some(source) = &entry.source {
            return Some(source.clone());
        }
        self.source
            .base_url
            .as_ref()
            .map(|base| format!("{}/{}.git", base.trim_end_matches('/'), entry.name))
    }

    /// Configured repositories as entities, in file order.
    ///
    /// Repositories without a resolvable source are left out; `validate`
    /// reports them.
    pub fn entities(&self) -> Vec<Entity> {
        self.repositories
            .iter()
            .filter_map(|entry| {
                self.source_for(entry)
                    .map(|source| Entity::new(&entry.name, &entry.description, source))
            })
            .collect()
    }

    /// Retry policy with configured delays and per-category overrides.
    ///
    /// Unknown category names are ignored here and reported by `validate`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        );
        for (name, max) in &self.retry.max_retries {
            if let Ok(category) = name.parse::<ErrorCategory>() {
                policy = policy.with_max_retries(category, *max);
            }
        }
        policy
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.org().is_none() {
            warnings.push(
                "No destination organization: set [destination] org or MIGRATOR_ORG".to_string(),
            );
        }

        let mut seen = HashSet::new();
        for entry in &self.repositories {
            if !REPOSITORY_NAME.is_match(&entry.name) {
                warnings.push(format!(
                    "Invalid repository name '{}': use letters, digits, '.', '_' or '-'",
                    entry.name
                ));
            }
            if !seen.insert(entry.name.as_str()) {
                warnings.push(format!("Duplicate repository name '{}'", entry.name));
            }
            if self.source_for(entry).is_none() {
                warnings.push(format!(
                    "Repository '{}' has no source and [source] base_url is not set",
                    entry.name
                ));
            }
        }

        if self.migration.backup_retention == 0 {
            warnings.push("backup_retention is 0: state file backups are disabled".to_string());
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            warnings.push(format!(
                "max_delay_ms ({}) is smaller than base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            ));
        }

        for name in self.retry.max_retries.keys() {
            if name.parse::<ErrorCategory>().is_err() {
                warnings.push(format!("Unknown error category '{}' in [retry.max_retries]", name));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_empty_destination_policy_display() {
        assert_eq!(EmptyDestinationPolicy::Prompt.to_string(), "prompt");
        assert_eq!(EmptyDestinationPolicy::Reuse.to_string(), "reuse");
        assert_eq!(EmptyDestinationPolicy::Abort.to_string(), "abort");
    }

    #[test]
    fn test_empty_destination_policy_from_str() {
        assert_eq!(
            "REUSE".parse::<EmptyDestinationPolicy>().unwrap(),
            EmptyDestinationPolicy::Reuse
        );
        let err = "maybe".parse::<EmptyDestinationPolicy>().unwrap_err();
        assert!(err.to_string().contains("Invalid empty destination policy"));
    }

    #[test]
    fn test_parse_empty() {
        let toml = MigratorToml::parse("").unwrap();
        assert_eq!(toml.destination.api_url, "https://api.github.com");
        assert_eq!(toml.destination.token_env, "GITHUB_TOKEN");
        assert!(toml.destination.private);
        assert_eq!(toml.migration.empty_destination, EmptyDestinationPolicy::Prompt);
        assert_eq!(toml.migration.save_debounce_ms, 2000);
        assert_eq!(toml.migration.backup_retention, 5);
        assert_eq!(toml.retry.base_delay_ms, 1000);
        assert_eq!(toml.retry.max_delay_ms, 8000);
        assert!(toml.repositories.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let content = r#"
[source]
base_url = "https://git.example.com/scm/team/"

[destination]
org = "acme"
private = false

[migration]
empty_destination = "reuse"
keep_local = true

[retry]
base_delay_ms = 10
max_delay_ms = 40

[retry.max_retries]
network = 5

[logging]
json = true

[[repositories]]
name = "svc-a"
description = "Service A"

[[repositories]]
name = "svc-b"
source = "ssh://git@other.example.com/svc-b.git"
"#;
        let toml = MigratorToml::parse(content).unwrap();
        assert_eq!(toml.destination.org.as_deref(), Some("acme"));
        assert!(!toml.destination.private);
        assert_eq!(toml.migration.empty_destination, EmptyDestinationPolicy::Reuse);
        assert!(toml.migration.keep_local);
        assert!(toml.logging.json);

        let entities = toml.entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(
            entities[0].source_address,
            "https://git.example.com/scm/team/svc-a.git"
        );
        assert_eq!(entities[0].description, "Service A");
        assert_eq!(entities[1].source_address, "ssh://git@other.example.com/svc-b.git");

        let policy = toml.retry_policy();
        assert_eq!(policy.max_retries(ErrorCategory::Network), 5);
        assert_eq!(policy.max_retries(ErrorCategory::ApiOperation), 2);
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(5), Duration::from_millis(40));
    }

    #[test]
    fn test_parse_invalid_policy_fails() {
        let content = r#"
[migration]
empty_destination = "sometimes"
"#;
        assert!(MigratorToml::parse(content).is_err());
    }

    #[test]
    fn test_entities_skip_unresolvable_sources() {
        let content = r#"
[[repositories]]
name = "orphan"

[[repositories]]
name = "pinned"
source = "/srv/git/pinned.git"
"#;
        let toml = MigratorToml::parse(content).unwrap();
        let entities = toml.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "pinned");
    }

    #[test]
    fn test_validate_valid() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let content = r#"
[source]
base_url = "https://git.example.com"

[destination]
org = "acme"

[[repositories]]
name = "svc-a"
"#;
        let toml = MigratorToml::parse(content).unwrap();
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let content = r#"
[migration]
backup_retention = 0

[retry]
base_delay_ms = 5000
max_delay_ms = 1000

[retry.max_retries]
cosmic_rays = 2

[[repositories]]
name = "svc a"

[[repositories]]
name = "svc-b"
source = "/srv/git/svc-b.git"

[[repositories]]
name = "svc-b"
source = "/srv/git/svc-b.git"
"#;
        let toml = MigratorToml::parse(content).unwrap();
        let warnings = toml.validate();
        let has = |needle: &str| warnings.iter().any(|w| w.contains(needle));

        if std::env::var("MIGRATOR_ORG").is_err() {
            assert!(has("No destination organization"));
        }
        assert!(has("Invalid repository name 'svc a'"));
        assert!(has("Duplicate repository name 'svc-b'"));
        assert!(has("Repository 'svc a' has no source"));
        assert!(has("backup_retention is 0"));
        assert!(has("max_delay_ms (1000) is smaller"));
        assert!(has("Unknown error category 'cosmic_rays'"));
    }

    #[test]
    fn test_git_cmd_priority() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut toml = MigratorToml::default();
        toml.migration.git_cmd = Some("/opt/git/bin/git".to_string());
        assert_eq!(toml.git_cmd(), "/opt/git/bin/git");
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let toml = MigratorToml::template();
        toml.save(&path).unwrap();

        let loaded = MigratorToml::load(&path).unwrap();
        assert_eq!(loaded.destination.org.as_deref(), Some("my-org"));
        assert_eq!(loaded.repositories, toml.repositories);
        assert_eq!(loaded.migration.empty_destination, EmptyDestinationPolicy::Prompt);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = MigratorToml::load_or_default(dir.path()).unwrap();
        assert!(toml.repositories.is_empty());
    }

    #[test]
    fn test_load_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[[repositories]\nname = ").unwrap();
        let err = MigratorToml::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse migrator.toml"));
    }
}
