//! Error types for merging
//!
//! Block-level merges cannot fail. File-level merges fail only when an input
//! holds nothing to merge.

/// Errors from file-level merges
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Input text contained no blocks
    #[error("no blocks in {0} text")]
    NoBlocks(&'static str),

    /// Strategy name not recognized
    #[error("unknown merge strategy: '{0}'")]
    UnknownStrategy(String),
}
