use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::rewrite::UrlRewrite;

/// Environment variable consulted when the config file has no `token`.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// GitHub never returns more than this many items per page.
const MAX_PER_PAGE: u32 = 100;

fn default_org() -> String {
    "rust-lang".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

const fn default_max_concurrency() -> usize {
    8
}

const fn default_paginate() -> bool {
    true
}

const fn default_per_page() -> u32 {
    MAX_PER_PAGE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rewrite_from() -> Vec<String> {
    vec!["http://www.ncameron.org/highfive/newpr.py".to_string()]
}

fn default_rewrite_to() -> String {
    "https://www.ncameron.org/highfive/newpr.py".to_string()
}

/// Which callback URLs are considered insecure and what they become.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteConfig {
    #[serde(default = "default_rewrite_from")]
    pub from: Vec<String>,
    #[serde(default = "default_rewrite_to")]
    pub to: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            from: default_rewrite_from(),
            to: default_rewrite_to(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub username: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_paginate")]
    pub paginate: bool,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

/// Identity and token presented on every API call.
///
/// Built once at startup and handed to the client; never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    token: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
        }
    }

    /// Sent as the `User-Agent` header.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("token {}", self.token)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Path used when `--config` is not given.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("webhook-patcher").join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::default_path()?),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|err| ConfigError::ReadFailed(path.to_path_buf(), err))?;
        toml::from_str(&content).map_err(|err| ConfigError::ParseFailed(path.to_path_buf(), err))
    }

    /// Reject values the patcher cannot run with.
    ///
    /// Loading does not validate; call this once CLI overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username must not be empty".into()));
        }
        if self.org.trim().is_empty() {
            return Err(ConfigError::Invalid("org must not be empty".into()));
        }
        if !(self.api_base.starts_with("https://") || self.api_base.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "api_base must be an http(s) URL, got {:?}",
                self.api_base
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ConfigError::Invalid(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}, got {}",
                self.per_page
            )));
        }
        if self.rewrite.from.is_empty() {
            return Err(ConfigError::Invalid("rewrite.from must list at least one URL".into()));
        }
        if self.rewrite.to.is_empty() {
            return Err(ConfigError::Invalid("rewrite.to must not be empty".into()));
        }
        if self.rewrite.from.contains(&self.rewrite.to) {
            return Err(ConfigError::Invalid(
                "rewrite.to must not also appear in rewrite.from".into(),
            ));
        }
        Ok(())
    }

    /// Resolve credentials, falling back to `$GITHUB_TOKEN` for the token.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let token = resolve_token(self.token.as_deref(), std::env::var(TOKEN_ENV_VAR).ok())
            .ok_or(ConfigError::MissingToken)?;
        Ok(Credentials::new(self.username.clone(), token))
    }

    pub fn url_rewrite(&self) -> UrlRewrite {
        UrlRewrite::new(self.rewrite.from.clone(), self.rewrite.to.clone())
    }
}

fn resolve_token(from_file: Option<&str>, from_env: Option<String>) -> Option<String> {
    // Precedence: config file > environment
    from_file
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| from_env.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
}
