//! Unitport Conflict Detection
//!
//! Finds where a resolved dependency closure would clash with a target
//! installation, grades each clash, and proposes ranked resolutions.
//!
//! # Overview
//!
//! - **TargetIndex**: definition names and relative paths of the target
//! - **ConflictDetector**: Duplicate, NameCollision and FileOverwrite detection
//! - **RenameGenerator**: collision-free `ZH_` renames
//! - **DiagnosisEngine**: severity table and ranked [`ResolutionOption`]s
//! - **Decisions**: caller choices, defaulting to the top auto-applicable option

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod conflict;
pub mod diagnosis;
pub mod error;
pub mod rename;
pub mod target;

// Re-exports
pub use conflict::{ConflictDetector, ConflictEntry, ConflictKind, ConflictReport};
pub use diagnosis::{Decisions, Diagnosis, DiagnosisEngine, ResolutionAction, ResolutionOption, Severity, SeverityTable};
pub use error::ConflictError;
pub use rename::RenameGenerator;
pub use target::{TargetDefinition, TargetIndex};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
