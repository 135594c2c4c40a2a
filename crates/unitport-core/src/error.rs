//! Error types for Unitport Core
//!
//! [`MigrationError`] aggregates the errors of every stage so callers of the
//! migrator handle one type.

use std::path::PathBuf;
use unitport_block::BlockError;
use unitport_conflict::ConflictError;
use unitport_graph::SourceError;
use unitport_merge::MergeError;
use unitport_transfer::{JournalError, RollbackError, StateError, TransferError};

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid for the schema
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Parser vocabulary is unusable
    #[error("invalid parser vocabulary: {0}")]
    Vocabulary(#[from] BlockError),
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source installation could not be indexed or read
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The root unit is not defined in the source
    #[error("unit not found in source: {0}")]
    UnitNotFound(String),

    /// Target scan failed or a decision was invalid
    #[error("conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// File merge failed
    #[error("merge of {path} failed: {source}")]
    Merge {
        path: String,
        #[source]
        source: MergeError,
    },

    /// IO error while planning
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transfer failed; applied operations were undone
    #[error("{0}")]
    Transfer(#[from] TransferError),

    /// Journal access failed
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// Rollback failed or was rejected
    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Illegal state transition
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl MigrationError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the destination was left untouched or fully restored
    #[must_use]
    pub fn destination_intact(&self) -> bool {
        match self {
            Self::Transfer(e) => e.is_clean_failure(),
            Self::Rollback(RollbackError::Incomplete { .. }) => false,
            _ => true,
        }
    }

    /// Check if the error is the caller's to fix (config or decisions)
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Config(_) | Self::UnitNotFound(_) => true,
            Self::Conflict(e) => e.is_decision_error(),
            Self::Rollback(e) => e.is_no_op(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_failures_report_whether_destination_is_intact() {
        let clean = MigrationError::from(TransferError::Failed {
            unit: "Tank".to_string(),
            relative_path: "a.ini".to_string(),
            reason: "boom".to_string(),
            undone: 1,
            undo_errors: Vec::new(),
        });
        assert!(clean.destination_intact());

        let dirty = MigrationError::from(TransferError::Failed {
            unit: "Tank".to_string(),
            relative_path: "a.ini".to_string(),
            reason: "boom".to_string(),
            undone: 0,
            undo_errors: vec!["cannot restore".to_string()],
        });
        assert!(!dirty.destination_intact());
    }

    #[test]
    fn decision_errors_are_user_errors() {
        let err = MigrationError::from(ConflictError::InvalidDecision {
            key: "name:Tank".to_string(),
            action: "merge".to_string(),
        });
        assert!(err.is_user_error());
        assert!(!MigrationError::from(ConflictError::Task("join".to_string())).is_user_error());
    }
}
