//! TOML configuration and secret resolution.
//!
//! Non-secret settings live in the config file; the GitHub token and the
//! analytics address/key are read from the environment (optionally seeded
//! from a `.env` file) and validated before any network call is made.
//!
//! ```toml
//! [source]
//! owner = "mindsdb"
//! repo = "mindsdb"
//!
//! [analytics]
//! url = "http://localhost:47334/api/sql/query"
//! table = "github_issues_data"
//!
//! [export]
//! path = "/tmp/github_data.csv"
//!
//! [schedule]
//! interval_secs = 3600
//!
//! [server]
//! bind = "0.0.0.0:8081"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sql;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_true")]
    pub include_pull_requests: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_API_KEY".to_string()
}
fn default_state() -> String {
    "open".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_url")]
    pub url: String,
    /// Environment variable that, when set, overrides `url`.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    /// Environment variable holding an optional bearer key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Model whose `comment_embedding` output drives similarity search.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            url: default_analytics_url(),
            url_env: default_url_env(),
            key_env: default_key_env(),
            table: default_table(),
            model: default_model(),
            similarity_threshold: default_similarity_threshold(),
            search_limit: default_search_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_analytics_url() -> String {
    "http://localhost:47334/api/sql/query".to_string()
}
fn default_url_env() -> String {
    "MINDSDB_SQL_API".to_string()
}
fn default_key_env() -> String {
    "MINDSDB_API_KEY".to_string()
}
fn default_table() -> String {
    "github_issues_data".to_string()
}
fn default_model() -> String {
    "semantic_search_model".to_string()
}
fn default_similarity_threshold() -> f64 {
    0.8
}
fn default_search_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_path")]
    pub path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

fn default_export_path() -> PathBuf {
    PathBuf::from("/tmp/github_data.csv")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    /// Refresh (through the single writer) before rendering each dashboard request.
    #[serde(default)]
    pub refresh_on_request: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_on_start: true,
            refresh_on_request: false,
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8081".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.source.owner.trim().is_empty() || config.source.repo.trim().is_empty() {
        bail!("source.owner and source.repo must not be empty");
    }
    if !(1..=100).contains(&config.source.per_page) {
        bail!("source.per_page must be in [1, 100]");
    }
    if config.source.max_pages == 0 {
        bail!("source.max_pages must be >= 1");
    }
    if config.source.timeout_secs == 0 {
        bail!("source.timeout_secs must be >= 1");
    }
    match config.source.state.as_str() {
        "open" | "closed" | "all" => {}
        other => bail!(
            "Unknown source.state: '{}'. Must be open, closed, or all.",
            other
        ),
    }

    sql::ident(&config.analytics.table)
        .map_err(|e| anyhow::anyhow!("analytics.table: {}", e))?;
    sql::ident(&config.analytics.model)
        .map_err(|e| anyhow::anyhow!("analytics.model: {}", e))?;
    if !(0.0..=1.0).contains(&config.analytics.similarity_threshold) {
        bail!("analytics.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.analytics.search_limit < 1 {
        bail!("analytics.search_limit must be >= 1");
    }
    if config.analytics.timeout_secs == 0 {
        bail!("analytics.timeout_secs must be >= 1");
    }

    if config.schedule.interval_secs < 60 {
        bail!("schedule.interval_secs must be >= 60");
    }
    if config.export.path.as_os_str().is_empty() {
        bail!("export.path must not be empty");
    }
    // The analytics service opens this path itself, from its own working directory.
    if !config.export.path.is_absolute() {
        bail!(
            "export.path must be absolute, got '{}'",
            config.export.path.display()
        );
    }

    Ok(config)
}

/// Failures while resolving secrets from the environment.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("{0} environment variable not set")]
    Missing(String),
    #[error("{var} is malformed: {reason}")]
    Malformed { var: String, reason: String },
}

/// Credentials and addresses resolved from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub github_token: String,
    pub analytics_url: String,
    pub analytics_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &"<redacted>")
            .field("analytics_url", &self.analytics_url)
            .field(
                "analytics_key",
                &self.analytics_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Secrets {
    /// Resolve secrets from the process environment.
    pub fn from_env(config: &Config) -> Result<Self, SecretsError> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve secrets through an arbitrary lookup (used by tests).
    pub fn resolve<F>(config: &Config, lookup: F) -> Result<Self, SecretsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_var = &config.source.token_env;
        let github_token = lookup(token_var)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SecretsError::Missing(token_var.clone()))?;
        if github_token.chars().any(char::is_whitespace) {
            return Err(SecretsError::Malformed {
                var: token_var.clone(),
                reason: "token contains whitespace".to_string(),
            });
        }

        let (url_source, analytics_url) = match lookup(&config.analytics.url_env)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
        {
            Some(url) => (config.analytics.url_env.clone(), url),
            None => ("analytics.url".to_string(), config.analytics.url.clone()),
        };
        validate_http_url(&analytics_url).map_err(|reason| SecretsError::Malformed {
            var: url_source,
            reason,
        })?;

        let analytics_key = lookup(&config.analytics.key_env)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            github_token,
            analytics_url,
            analytics_key,
        })
    }
}

fn validate_http_url(raw: &str) -> std::result::Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}
