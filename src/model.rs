//! Shapes of the GitHub API objects the patcher reads and writes.
//!
//! Only the fields the patcher consumes are typed. A hook's `config` is kept
//! as a raw JSON object so that fields the patcher knows nothing about
//! (`content_type`, `secret`, `insecure_ssl`, ...) are sent back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An organization repository. Every other field GitHub returns is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
}

/// A repository webhook as returned by `GET /repos/{org}/{repo}/hooks`.
#[derive(Debug, Clone, Deserialize)]
pub struct Hook {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Hook {
    /// The callback URL, if the config carries one as a string.
    pub fn url(&self) -> Option<&str> {
        self.config.get("url").and_then(Value::as_str)
    }
}

/// Body of `PATCH /repos/{org}/{repo}/hooks/{id}`.
///
/// Always carries the complete config, never a partial diff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    pub config: Map<String, Value>,
}
