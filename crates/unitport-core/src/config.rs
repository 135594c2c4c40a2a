//! Unitport configuration
//!
//! Every section has embedded defaults, so an empty file (or no file at all)
//! is a valid configuration. Any subset of a section may be overridden.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unitport_block::ParserVocabulary;
use unitport_conflict::{RenameGenerator, SeverityTable};
use unitport_graph::{ReferenceTable, ResolverConfig};
use unitport_merge::{FieldPolicyTable, MergeStrategy};
use unitport_transfer::DEFAULT_DIR_NAME;

/// Merge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    /// Strategy for file merges
    pub strategy: MergeStrategy,

    /// Numeric field policies for the smart strategy
    pub field_policies: FieldPolicyTable,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::Smart,
            field_policies: FieldPolicyTable::default(),
        }
    }
}

/// Source installation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Containers to index, relative to the source root
    ///
    /// When empty, every `*.big` file directly under the root is used, in
    /// name order.
    pub containers: Vec<PathBuf>,
}

/// Journal settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Directory under the destination holding journal and backups
    pub dir_name: String,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            dir_name: DEFAULT_DIR_NAME.to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitportConfig {
    pub resolver: ResolverConfig,
    pub parser: ParserVocabulary,
    pub references: ReferenceTable,
    pub severity: SeverityTable,
    pub merge: MergeSettings,
    pub rename: RenameGenerator,
    pub source: SourceSettings,
    pub journal: JournalSettings,
}

impl UnitportConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML for this
    /// schema, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    ///
    /// # Errors
    /// See [`UnitportConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.max_depth == 0 {
            return Err(ConfigError::Invalid("resolver.max_depth must be at least 1".to_string()));
        }
        if self.resolver.fan_out == 0 {
            return Err(ConfigError::Invalid("resolver.fan_out must be at least 1".to_string()));
        }
        if self.rename.prefix.is_empty() && self.rename.fallback_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "rename.prefix and rename.fallback_suffix cannot both be empty".to_string(),
            ));
        }
        let dir = &self.journal.dir_name;
        if dir.is_empty() || dir.contains(['/', '\\']) || dir == "." || dir == ".." {
            return Err(ConfigError::Invalid(format!(
                "journal.dir_name must be a single directory name, got {dir:?}"
            )));
        }
        self.parser.validate()?;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_parser(mut self, parser: ParserVocabulary) -> Self {
        self.parser = parser;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_references(mut self, references: ReferenceTable) -> Self {
        self.references = references;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_severity(mut self, severity: SeverityTable) -> Self {
        self.severity = severity;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge.strategy = strategy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_field_policies(mut self, policies: FieldPolicyTable) -> Self {
        self.merge.field_policies = policies;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_rename(mut self, rename: RenameGenerator) -> Self {
        self.rename = rename;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_journal_dir(mut self, dir_name: impl Into<String>) -> Self {
        self.journal.dir_name = dir_name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_container(mut self, container: impl Into<PathBuf>) -> Self {
        self.source.containers.push(container.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitport_merge::NumericPolicy;

    #[test]
    fn empty_file_is_the_default() {
        let config: UnitportConfig = toml::from_str("").unwrap();
        assert_eq!(config, UnitportConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: UnitportConfig = toml::from_str(
            r#"
            [resolver]
            fan_out = 8

            [merge]
            strategy = "target_wins"

            [merge.field_policies.exact]
            Armor = "lower_wins"

            [rename]
            prefix = "GLA_"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolver.fan_out, 8);
        assert_eq!(config.resolver.max_depth, 100);
        assert_eq!(config.merge.strategy, MergeStrategy::TargetWins);
        assert_eq!(config.merge.field_policies.policy_for("Armor"), NumericPolicy::LowerWins);
        assert_eq!(config.merge.field_policies.policy_for("BuildCost"), NumericPolicy::LowerWins);
        assert_eq!(config.rename.prefix, "GLA_");
        assert_eq!(config.rename.fallback_suffix, "_v2");
        assert_eq!(config.journal.dir_name, ".unitport");
    }

    #[test]
    fn rejects_bad_values() {
        let zero_fan_out = UnitportConfig::new().with_resolver(ResolverConfig::default().with_max_depth(0));
        assert!(zero_fan_out.validate().is_err());

        let nested_dir = UnitportConfig::new().with_journal_dir("a/b");
        assert!(matches!(nested_dir.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unitport.toml");
        std::fs::write(&path, "[resolver]\nmax_depth = \"deep\"\n").unwrap();

        let err = UnitportConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("unitport.toml"));
    }

    #[test]
    fn missing_path_means_defaults() {
        assert_eq!(UnitportConfig::load_or_default(None).unwrap(), UnitportConfig::default());
    }
}
