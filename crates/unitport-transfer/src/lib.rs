//! Unitport Transfer
//!
//! Journaled, all-or-nothing migration of a file set into a destination
//! installation, with later rollback and crash recovery.
//!
//! # Overview
//!
//! - **MigrationState**: `Pending -> Analyzing -> Transferring -> Succeeded | Failed`, then `RolledBack`
//! - **JournalStore**: one JSON record per migration under the destination
//! - **TransferEngine**: temp-then-rename writes with backups, undone on failure
//! - **RollbackService**: reverse a past migration, recover an interrupted one

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod journal;
pub mod rollback;
pub mod state;

// Re-exports
pub use engine::{TransferContent, TransferEngine, TransferItem, TransferMode, TransferOutcome, TransferPlan};
pub use error::{JournalError, RollbackError, StateError, TransferError};
pub use journal::{
    short_id, temp_path, JournalEntry, JournalOperation, JournalStore, OperationKind, DEFAULT_DIR_NAME, TEMP_SUFFIX,
};
pub use rollback::{RecoveryReport, RollbackOutcome, RollbackService};
pub use state::MigrationState;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
