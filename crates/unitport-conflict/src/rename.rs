//! Rename generation for colliding definition names

use serde::{Deserialize, Serialize};

/// Produces collision-free names
///
/// The first candidate is `<prefix><name>`. Names already carrying the prefix
/// get `<name><fallback_suffix>` instead. When the candidate is taken, numeric
/// suffixes are tried in order: `<candidate>_2`, `<candidate>_3`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameGenerator {
    /// Prefix prepended to colliding names
    pub prefix: String,

    /// Suffix used when the name already has the prefix
    pub fallback_suffix: String,
}

impl Default for RenameGenerator {
    fn default() -> Self {
        Self {
            prefix: "ZH_".to_string(),
            fallback_suffix: "_v2".to_string(),
        }
    }
}

impl RenameGenerator {
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_fallback_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.fallback_suffix = suffix.into();
        self
    }

    /// First candidate for `name`, before collision checks
    #[must_use]
    pub fn candidate(&self, name: &str) -> String {
        if !self.prefix.is_empty() && name.starts_with(&self.prefix) {
            format!("{name}{}", self.fallback_suffix)
        } else {
            format!("{}{name}", self.prefix)
        }
    }

    /// First available rename for `name`
    pub fn generate(&self, name: &str, taken: impl Fn(&str) -> bool) -> String {
        let base = self.candidate(name);
        if !taken(&base) {
            return base;
        }
        (2u32..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefixes_plain_names() {
        let gen = RenameGenerator::default();
        assert_eq!(gen.generate("Tank", |_| false), "ZH_Tank");
    }

    #[test]
    fn suffixes_already_prefixed_names() {
        let gen = RenameGenerator::default();
        assert_eq!(gen.generate("ZH_Tank", |_| false), "ZH_Tank_v2");
    }

    #[test]
    fn retries_numeric_suffixes() {
        let gen = RenameGenerator::default();
        let taken: HashSet<&str> = ["ZH_Tank", "ZH_Tank_2"].into_iter().collect();
        assert_eq!(gen.generate("Tank", |n| taken.contains(n)), "ZH_Tank_3");
    }

    #[test]
    fn custom_prefix() {
        let gen = RenameGenerator::default().with_prefix("Port_");
        assert_eq!(gen.candidate("Tank"), "Port_Tank");
    }
}
