//! Unitport Core
//!
//! Ties the pipeline together:
//! - Loads configuration for every component
//! - Analyzes a unit (resolve, detect conflicts, diagnose) without side effects
//! - Plans a migration from conflict decisions (renames, skips, merges)
//! - Runs the journaled transfer, and fronts history, rollback and recovery
//!
//! # Example
//!
//! ```rust,ignore
//! use unitport_core::{MigrationRequest, Migrator, UnitportConfig};
//! use unitport_graph::TracingSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let migrator = Migrator::new(UnitportConfig::load(std::path::Path::new("unitport.toml"))?);
//! let request = MigrationRequest::new("/games/source", "AmericaTankCrusader", "/games/target");
//!
//! let report = migrator.migrate(&request, &TracingSink).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod migrator;
pub mod planner;
pub mod rewrite;

// Re-exports for convenience
pub use config::{JournalSettings, MergeSettings, SourceSettings, UnitportConfig};
pub use error::{ConfigError, MigrationError};
pub use migrator::{Analysis, GraphStats, MigrationReport, MigrationRequest, Migrator};
pub use planner::{AppliedDecision, MigrationPlan, PlannedMerge, Planner};
pub use rewrite::{apply_renames, retain_blocks};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
