use regex::Regex;

use crate::error::ProxyError;

/// A path rewrite rule: the first match of `pattern` is replaced by `replacement`
#[derive(Clone, Debug)]
pub struct PathRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRewrite {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, ProxyError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Rule removing a literal leading prefix
    pub fn strip_prefix(prefix: &str) -> Result<Self, ProxyError> {
        Self::new(&format!("^{}", regex::escape(prefix)), "")
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Apply the rule once, or None when the pattern does not match
    pub fn apply(&self, path: &str) -> Option<String> {
        if !self.pattern.is_match(path) {
            return None;
        }
        Some(
            self.pattern
                .replacen(path, 1, regex::NoExpand(&self.replacement))
                .into_owned(),
        )
    }
}

/// Rewrite a request path with the first matching rule.
///
/// The result always starts with `/`; unmatched paths pass through unchanged.
pub fn rewrite_path(rules: &[PathRewrite], path: &str) -> String {
    let rewritten = rules
        .iter()
        .find_map(|rule| rule.apply(path))
        .unwrap_or_else(|| path.to_string());

    if rewritten.starts_with('/') {
        rewritten
    } else {
        format!("/{}", rewritten)
    }
}
