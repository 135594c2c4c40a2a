//! Unitport Merge Engine
//!
//! Field-level merge of two versions of the same definition block, and of two
//! definition files block by block.
//!
//! # Example
//!
//! ```rust
//! use unitport_block::Block;
//! use unitport_merge::{FieldStatus, MergeEngine, MergeStrategy};
//!
//! let incoming = Block::new("Object", "Tank").with_field("BuildCost", "1000");
//! let existing = Block::new("Object", "Tank").with_field("BuildCost", "800");
//!
//! let merged = MergeEngine::default().merge(&existing, &incoming, MergeStrategy::Smart);
//! assert_eq!(merged.block.first_value("BuildCost"), Some("800"));
//! assert_eq!(merged.report.count(FieldStatus::Modified), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod files;
pub mod policy;
pub mod strategy;

// Re-exports
pub use engine::{FieldMerge, FieldStatus, MergeEngine, MergeReport, MergedBlock, MergedValue, Provenance};
pub use error::MergeError;
pub use files::FileMerge;
pub use policy::{first_number, FieldPolicyTable, NumericPolicy, PolicyRule};
pub use strategy::MergeStrategy;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
