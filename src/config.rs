use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::pr;

pub const DEFAULT_CONFIG_FILE: &str = ".queue-index-advisor.toml";

pub const TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";
pub const REF_VAR: &str = "GITHUB_REF";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Top-level configuration loaded from .queue-index-advisor.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API root. Point at a GitHub Enterprise host if needed.
    pub api_url: String,
    /// Used only when GITHUB_TOKEN is not set.
    pub token: Option<String>,
    /// Page size for the pulls-files listing; capped at the platform's 100.
    pub files_per_page: u32,
    /// Pages of changed files to read. One page matches the platform's
    /// unpaginated behavior; PRs with more files lose coverage past it.
    pub max_file_pages: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            files_per_page: 30,
            max_file_pages: 1,
        }
    }
}

/// Names the detectors look for in changed files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Only files with this suffix are inspected for mapping migrations
    pub source_suffix: String,
    /// Added files with this suffix are new queue actions
    pub new_action_suffix: String,
    /// Class every queue action extends
    pub base_class: String,
    /// Mapping method that assumes no index
    pub plain_method: String,
    /// Mapping method that assumes an index on the queue table
    pub indexed_method: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            source_suffix: ".groovy".to_string(),
            new_action_suffix: "AsyncAction.groovy".to_string(),
            base_class: "BaseAsyncAction".to_string(),
            plain_method: "applyBaseMapping".to_string(),
            indexed_method: "applyBaseMappingWithIndex".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .queue-index-advisor.toml in
    /// the current directory. A missing default file yields the defaults; an
    /// explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Values the CI environment hands the tool before any API call is made.
/// The token goes to the API client; only the rest reaches the PR context.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvContext {
    pub access_token: String,
    pub repository: String,
    pub pr_number: u64,
}

impl std::fmt::Debug for EnvContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvContext")
            .field("access_token", &"<redacted>")
            .field("repository", &self.repository)
            .field("pr_number", &self.pr_number)
            .finish()
    }
}

/// What the environment says about this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(EnvContext),
    /// The trigger was not a pull request event; nothing to do.
    Skip { git_ref: String },
}

impl EnvContext {
    /// Resolve the run context through `lookup` (normally `std::env::var`).
    ///
    /// A missing or empty variable is a configuration error. A ref that does
    /// not carry a pull request number is not an error: the run is skipped.
    /// The token falls back to `fallback_token` (from the config file) when the
    /// variable is absent.
    pub fn resolve<F>(lookup: F, fallback_token: Option<&str>) -> Result<Resolution, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let access_token = non_empty(TOKEN_VAR)
            .or_else(|| fallback_token.map(str::to_string))
            .ok_or(ConfigError::MissingEnv(TOKEN_VAR))?;
        let repository = non_empty(REPOSITORY_VAR).ok_or(ConfigError::MissingEnv(REPOSITORY_VAR))?;
        let git_ref = non_empty(REF_VAR).ok_or(ConfigError::MissingEnv(REF_VAR))?;

        Ok(match pr::parse_pr_ref(&git_ref) {
            Some(pr_number) => Resolution::Ready(EnvContext {
                access_token,
                repository,
                pr_number,
            }),
            None => Resolution::Skip { git_ref },
        })
    }

    /// Complete the context with the PR's head and base commits.
    pub fn with_revisions(self, revisions: pr::PullRevisions) -> pr::PullRequestContext {
        pr::PullRequestContext {
            repository: self.repository,
            pr_number: self.pr_number,
            head_revision: revisions.head,
            base_revision: revisions.base,
        }
    }
}
