//! TOML-based configuration for langsync.
//!
//! The access token is stored as a `token_env` field that references an
//! environment variable name. The actual secret is resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::models::SyncTarget;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batch execution settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Upstream (source) repository settings.
    pub upstream: UpstreamConfig,

    /// GitHub API and credential settings.
    pub github: GitHubConfig,

    /// Per-language translation targets.
    #[serde(default)]
    pub languages: Vec<LanguageConfig>,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// How non-essential git command failures are treated.
///
/// Clone, pull, checkout, commit, merge and push are always checked;
/// `BestEffort` only relaxes identity configuration, where the original
/// workflow's tolerance is harmless.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandPolicy {
    /// Any non-zero exit aborts the run for that target.
    #[default]
    FailFast,
    /// Tolerate failures of idempotent setup commands, logging a warning.
    BestEffort,
}

impl std::fmt::Display for CommandPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Batch execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory that holds one clone per translation repository.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Maximum number of targets synchronized concurrently (default 1,
    /// i.e. sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delete a target's clone after a successful run.
    #[serde(default)]
    pub cleanup: bool,

    /// Directory for the per-invocation append log.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Failure handling for idempotent git setup commands.
    #[serde(default)]
    pub command_policy: CommandPolicy,
}

fn default_work_root() -> PathBuf {
    PathBuf::from("repo")
}
fn default_concurrency() -> usize {
    1
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            concurrency: default_concurrency(),
            cleanup: false,
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            command_policy: CommandPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// The source repository every translation fork pulls from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Account that owns the source repository and its translation forks.
    pub owner: String,

    /// Source repository name (without owner).
    pub repo: String,

    /// Default branch name (e.g. `main`).
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".into()
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Optional explicit git base URL override (for enterprise hosts or
    /// local `file://` remotes in tests). Derived from `api_url` if unset.
    #[serde(default)]
    pub git_base_url: Option<String>,

    /// Account name used for clone authentication and commit authorship.
    pub username: String,

    /// Commit author email.
    pub email: String,

    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "LANGSYNC_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// One translation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language code; the translation repository is named
    /// `<code>.<upstream.repo>`.
    pub code: String,

    /// Accounts to request review from when a conflict PR is opened.
    #[serde(default)]
    pub reviewers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the token from the environment variable named by
    /// `github.token_env`.
    ///
    /// A missing variable logs a warning but does **not** fail -- callers
    /// decide whether a token is required for their execution mode
    /// (`validate` runs without one).
    pub fn resolve_env_vars(&mut self) {
        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.owner.is_empty() || self.upstream.owner.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "upstream.owner".into(),
                detail: "owner must be a non-empty account name without '/'".into(),
            });
        }
        if self.upstream.repo.is_empty() || self.upstream.repo.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "upstream.repo".into(),
                detail: "repo must be a bare repository name without '/'".into(),
            });
        }
        if self.upstream.default_branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "upstream.default_branch".into(),
                detail: "default branch must not be empty".into(),
            });
        }
        if self.github.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.username".into(),
                detail: "username must not be empty".into(),
            });
        }
        if self.github.email.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.email".into(),
                detail: "email must not be empty".into(),
            });
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch.concurrency".into(),
                detail: "concurrency must be >= 1".into(),
            });
        }
        if self.languages.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "languages".into(),
                detail: "at least one [[languages]] entry is required".into(),
            });
        }

        // Language codes become directory and repository names; they must
        // be unique so clones never collide.
        let mut seen = std::collections::HashSet::new();
        for lang in &self.languages {
            if lang.code.is_empty()
                || lang.code.contains('/')
                || lang.code.chars().any(char::is_whitespace)
            {
                return Err(ConfigError::InvalidValue {
                    field: "languages.code".into(),
                    detail: format!("'{}' is not a usable language code", lang.code),
                });
            }
            if !seen.insert(lang.code.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "languages.code".into(),
                    detail: format!("duplicate language code '{}'", lang.code),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// All configured languages as sync targets.
    pub fn targets(&self) -> Vec<SyncTarget> {
        self.languages
            .iter()
            .map(|l| SyncTarget {
                language: l.code.clone(),
                reviewers: l.reviewers.clone(),
            })
            .collect()
    }

    /// Look up a single configured language.
    pub fn target_for(&self, code: &str) -> Option<SyncTarget> {
        self.languages.iter().find(|l| l.code == code).map(|l| SyncTarget {
            language: l.code.clone(),
            reviewers: l.reviewers.clone(),
        })
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[batch]
work_root = "repo"
concurrency = 3
cleanup = true
log_dir = "logs"
log_level = "debug"
command_policy = "best_effort"

[upstream]
owner = "single-spa"
repo = "single-spa.js.org"
default_branch = "master"

[github]
api_url = "https://api.github.com"
username = "sync-bot"
email = "sync-bot@example.com"
token_env = "LANGSYNC_TOKEN"

[[languages]]
code = "zh-hans"
reviewers = ["alice", "bob"]

[[languages]]
code = "fr"
reviewers = ["charlie"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.batch.concurrency, 3);
        assert!(config.batch.cleanup);
        assert_eq!(config.batch.command_policy, CommandPolicy::BestEffort);
        assert_eq!(config.upstream.owner, "single-spa");
        assert_eq!(config.upstream.default_branch, "master");
        assert_eq!(config.languages.len(), 2);
        assert_eq!(config.languages[0].reviewers, vec!["alice", "bob"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("langsync.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.batch.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/langsync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[upstream]
owner = "acme"
repo = "docs"

[github]
username = "bot"
email = "bot@example.com"

[[languages]]
code = "de"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.batch.work_root, PathBuf::from("repo"));
        assert_eq!(config.batch.concurrency, 1);
        assert!(!config.batch.cleanup);
        assert_eq!(config.batch.command_policy, CommandPolicy::FailFast);
        assert_eq!(config.upstream.default_branch, "main");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.token_env, "LANGSYNC_TOKEN");
        assert!(config.languages[0].reviewers.is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_owner() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.upstream.owner = String::new();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "upstream.owner"
        ));
    }

    #[test]
    fn test_validate_rejects_owner_with_slash() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.upstream.owner = "acme/docs".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.batch.concurrency = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "batch.concurrency"
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_language() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.languages.push(LanguageConfig {
            code: "fr".into(),
            reviewers: vec![],
        });
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "languages.code"
        ));
    }

    #[test]
    fn test_validate_rejects_no_languages() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.languages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("LANGSYNC_TEST_TOKEN", "ghp_abc");

        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.github.token_env = "LANGSYNC_TEST_TOKEN".into();
        config.resolve_env_vars();
        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));

        std::env::remove_var("LANGSYNC_TEST_TOKEN");
    }

    #[test]
    fn test_targets_mirror_languages() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        let targets = config.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].language, "zh-hans");
        assert_eq!(targets[1].reviewers, vec!["charlie"]);

        let one = config.target_for("fr").expect("fr is configured");
        assert_eq!(one.reviewers, vec!["charlie"]);
        assert!(config.target_for("xx").is_none());
    }
}
