//! Error types used throughout the patcher.
//!
//! Each concern has its own error enum so callers get precise, typed failure
//! information. All errors implement [`Display`](std::fmt::Display) so they
//! can be formatted into log lines without additional mapping.

use std::io;
use std::path::PathBuf;

/// Longest response body quoted inside an error message.
const MAX_BODY_IN_ERROR: usize = 512;

/// Errors that can occur while loading `config.toml`.
#[derive(Debug)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    NoConfigDir,
    /// The config file exists but could not be read (e.g. permission denied).
    ReadFailed(PathBuf, io::Error),
    /// The config file was read but is not valid TOML or is missing required fields.
    ParseFailed(PathBuf, toml::de::Error),
    /// Neither the config file nor `$GITHUB_TOKEN` supplied a token.
    MissingToken,
    /// A field parsed but holds a value the patcher cannot run with.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConfigDir => write!(f, "Could not determine config directory"),
            Self::ReadFailed(path, err) => {
                write!(f, "Failed to read config file {}: {err}", path.display())
            }
            Self::ParseFailed(path, err) => {
                write!(f, "Failed to parse config file {}: {err}", path.display())
            }
            Self::MissingToken => write!(
                f,
                "No API token: set `token` in the config file or export GITHUB_TOKEN"
            ),
            Self::Invalid(msg) => write!(f, "Invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while talking to the GitHub API.
///
/// Every variant that comes from a request carries the request path so a
/// failure can be attributed to the repository or hook it belongs to.
#[derive(Debug)]
pub enum ApiError {
    /// The request path did not begin with `/`.
    InvalidPath(String),
    /// The HTTP client could not be constructed.
    Client(String),
    /// The request body could not be serialized.
    Serialize(serde_json::Error),
    /// A connection-level failure (DNS, connection refused, timeout, etc.).
    Network { path: String, message: String },
    /// A `rel="next"` link pointed outside the configured API base.
    ForeignLink { path: String, url: String },
    /// The API answered with a non-2xx status.
    Status {
        path: String,
        status: u16,
        body: String,
    },
    /// The API answered 2xx but the body was not JSON of the expected shape.
    Malformed {
        path: String,
        body: String,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "Invalid API path {path:?}: must begin with '/'"),
            Self::Client(msg) => write!(f, "Failed to build HTTP client: {msg}"),
            Self::Serialize(err) => write!(f, "Failed to serialize request body: {err}"),
            Self::Network { path, message } => write!(f, "Network error on {path}: {message}"),
            Self::ForeignLink { path, url } => write!(
                f,
                "Refusing to follow next-page link of {path} outside the API base: {url}"
            ),
            Self::Status { path, status, body } => write!(
                f,
                "API error {status} on {path}: {}",
                truncate_at_char_boundary(body, MAX_BODY_IN_ERROR)
            ),
            Self::Malformed { path, body, source } => write!(
                f,
                "Malformed response from {path}: {source}; body: {}",
                truncate_at_char_boundary(body, MAX_BODY_IN_ERROR)
            ),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(err) | Self::Malformed { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

/// Truncate a string at a safe UTF-8 char boundary, appending "…" if truncated.
pub(crate) fn truncate_at_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut boundary = max_len;
        while boundary > 0 && !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}…", &s[..boundary])
    }
}
