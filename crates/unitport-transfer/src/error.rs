//! Error types for transfer, journal and rollback
//!
//! This is the strict path of the pipeline: every failure here is returned,
//! and a failed transfer has already undone its own work when the error
//! reaches the caller.

use crate::state::MigrationState;
use std::path::PathBuf;

/// Illegal migration state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Transition not in the state machine
    #[error("illegal migration state transition: {from} -> {to}")]
    IllegalTransition {
        from: MigrationState,
        to: MigrationState,
    },
}

/// Errors from the durable journal
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// IO error on a journal file
    #[error("journal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("journal record {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No record with this id
    #[error("journal entry not found: {0}")]
    NotFound(String),
}

impl JournalError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the record exists but cannot be read
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Errors from executing a transfer
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A file failed; every operation applied before it was undone
    #[error("transfer of {unit} failed at {relative_path}: {reason} ({undone} operations rolled back)")]
    Failed {
        unit: String,
        relative_path: String,
        reason: String,
        undone: usize,
        undo_errors: Vec<String>,
    },

    /// Journal could not be written before any file was touched
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// Entry was not in a state that allows transfer
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl TransferError {
    /// Check if the failure left files the undo could not restore
    #[must_use]
    pub fn is_clean_failure(&self) -> bool {
        match self {
            Self::Failed { undo_errors, .. } => undo_errors.is_empty(),
            _ => true,
        }
    }
}

/// Errors from rolling back a past migration
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Entry was already rolled back; nothing was done
    #[error("migration {0} was already rolled back")]
    AlreadyRolledBack(String),

    /// Entry is not in a state that can be rolled back
    #[error("migration {id} cannot be rolled back from state {state}")]
    NotRollbackable { id: String, state: MigrationState },

    /// Some operations could not be undone; the entry is left unmarked
    #[error("rollback of {id} incomplete: {}", errors.join("; "))]
    Incomplete { id: String, errors: Vec<String> },

    /// Journal access failed
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// State change rejected
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl RollbackError {
    /// Check if the request was rejected without touching any file
    #[inline]
    #[must_use]
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::AlreadyRolledBack(_) | Self::NotRollbackable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_rejections_are_no_ops() {
        assert!(RollbackError::AlreadyRolledBack("ab12cd34".to_string()).is_no_op());
        assert!(!RollbackError::Incomplete {
            id: "ab12cd34".to_string(),
            errors: vec!["x".to_string()],
        }
        .is_no_op());
    }

    #[test]
    fn failure_message_is_human_readable() {
        let err = TransferError::Failed {
            unit: "Tank".to_string(),
            relative_path: "Data/INI/Weapon.ini".to_string(),
            reason: "source unreadable".to_string(),
            undone: 2,
            undo_errors: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "transfer of Tank failed at Data/INI/Weapon.ini: source unreadable (2 operations rolled back)"
        );
        assert!(err.is_clean_failure());
    }
}
