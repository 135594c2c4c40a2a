//! Error types for conflict detection

use std::path::PathBuf;

/// Errors from target scanning and decision handling
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// IO error while scanning the target
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Target root missing or not a directory
    #[error("invalid target root: {0}")]
    InvalidRoot(PathBuf),

    /// Background scan task failed
    #[error("target scan task failed: {0}")]
    Task(String),

    /// Caller chose an action the diagnosis does not offer
    #[error("decision for '{key}' is not an offered option: {action}")]
    InvalidDecision { key: String, action: String },
}

impl ConflictError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if error was caused by the caller's decisions
    #[inline]
    #[must_use]
    pub fn is_decision_error(&self) -> bool {
        matches!(self, Self::InvalidDecision { .. })
    }
}
