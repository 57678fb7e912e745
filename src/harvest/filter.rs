//! Exclusion policy for objects that must never be copied.
//!
//! Service-account tokens, registry pull secrets and autoscaler tokens are
//! cluster-owned and never copied. The policy is a blocklist of name
//! fragments; anything not matching is copied.

use crate::model::ObjectName;

/// Name fragments excluded by default.
pub const DEFAULT_EXCLUSIONS: [&str; 3] = ["default", "registry", "pod-autoscaler-token"];

/// Substring blocklist shared by the harvest and migration paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPolicy {
    patterns: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_EXCLUSIONS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ExclusionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds extra fragments on top of the defaults. Blank fragments are
    /// ignored since they would match every name.
    pub fn with_patterns<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in extra {
            let pattern = pattern.into();
            if !pattern.trim().is_empty() && !self.patterns.contains(&pattern) {
                self.patterns.push(pattern);
            }
        }
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| name.contains(p.as_str())) || name.trim().is_empty()
    }

    /// Splits `names` into `(kept, excluded)`, preserving listing order.
    pub fn partition(&self, names: Vec<ObjectName>) -> (Vec<ObjectName>, Vec<ObjectName>) {
        names
            .into_iter()
            .partition(|name| !self.is_excluded(name.as_str()))
    }
}

/// [`ExclusionPolicy::is_excluded`] with the default blocklist.
pub fn is_excluded(name: &str) -> bool {
    name.trim().is_empty() || DEFAULT_EXCLUSIONS.iter().any(|p| name.contains(p))
}
