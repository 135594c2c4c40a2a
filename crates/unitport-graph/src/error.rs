//! Error types for source access
//!
//! Resolution itself never fails: gaps become `Missing` nodes and cycles become
//! `Invalid` nodes. These errors come from reading definitions and containers.

use std::path::PathBuf;

/// Errors from the packed container reader
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// IO error on the container file
    #[error("io error on container {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Header magic not recognized
    #[error("not a packed container: {path}")]
    InvalidMagic { path: PathBuf },

    /// Header or entry table shorter than declared
    #[error("truncated container index: {path}")]
    Truncated { path: PathBuf },

    /// Entry does not exist in the container
    #[error("entry '{entry}' not found in {container}")]
    EntryNotFound { container: PathBuf, entry: String },

    /// Entry extends past the end of the container
    #[error("entry '{entry}' out of bounds in {container}")]
    EntryOutOfBounds { container: PathBuf, entry: String },
}

impl ArchiveError {
    /// Create IO error for container path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from definition indexes
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// IO error reading a loose file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container access failed
    #[error("container error: {0}")]
    Archive(#[from] ArchiveError),

    /// Location not served by this index
    #[error("location not available: {0}")]
    UnknownLocation(String),

    /// Source root missing or not a directory
    #[error("invalid source root: {0}")]
    InvalidRoot(PathBuf),

    /// Background scan task failed
    #[error("scan task failed: {0}")]
    Task(String),
}

impl SourceError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
