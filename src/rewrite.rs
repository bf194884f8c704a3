//! The one decision the patcher makes: does this hook need a new URL?

use serde_json::Value;

use crate::model::{Hook, PatchRequest};

/// Maps insecure callback URLs onto their replacement.
///
/// Matching is an exact, case-sensitive string comparison. No normalization
/// is applied, so a trailing slash or a different scheme is a different URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewrite {
    from: Vec<String>,
    to: String,
}

impl UrlRewrite {
    pub fn new(from: Vec<String>, to: String) -> Self {
        Self { from, to }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.from.iter().any(|candidate| candidate == url)
    }

    pub fn target(&self) -> &str {
        &self.to
    }

    /// Build the patch for `hook`, or `None` when its URL does not match.
    ///
    /// The returned config is a copy of the hook's config with only `url`
    /// replaced.
    pub fn patch_for(&self, hook: &Hook) -> Option<PatchRequest> {
        if !self.matches(hook.url()?) {
            return None;
        }
        let mut config = hook.config.clone();
        config.insert("url".to_string(), Value::String(self.to.clone()));
        Some(PatchRequest { config })
    }
}
