//! Unitport Dependency Graph
//!
//! Cycle-safe resolution of a unit's dependency closure over definitions held
//! in loose files and packed containers.
//!
//! # Overview
//!
//! - **DependencyGraph**: flat arena of [`Node`]s keyed by [`NodeId`]
//! - **DependencyResolver**: two-phase resolver with bounded fan-out and memoization
//! - **DefinitionIndex**: name lookup collaborator ([`MemoryIndex`], [`SourceIndex`])
//! - **ArchiveReader**: packed container collaborator ([`BigArchiveReader`])
//! - **ProgressSink**: injected progress reporting
//!
//! # Example
//!
//! ```rust
//! use unitport_graph::{DependencyResolver, MemoryIndex, NoopSink};
//!
//! # let runtime = tokio::runtime::Runtime::new().unwrap();
//! # runtime.block_on(async {
//! let index = MemoryIndex::new()
//!     .with_file("Data/INI/Object/Tank.ini", "Object Tank\n  Weapon = TankGun\nEnd\n")
//!     .with_file("Data/INI/Weapon.ini", "Weapon TankGun\nEnd\n");
//!
//! let graph = DependencyResolver::default().resolve("Tank", &index, &NoopSink).await;
//! assert_eq!(graph.found_count(), 2);
//! assert_eq!(graph.completion(), 100.0);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod archive;
pub mod error;
pub mod graph;
pub mod node;
pub mod progress;
pub mod references;
pub mod resolver;
pub mod source;
pub mod source_index;

// Re-exports
pub use archive::{encode_big, BigArchive, BigArchiveReader, BigEntry};
pub use error::{ArchiveError, SourceError};
pub use graph::{ClosureFile, DependencyGraph};
pub use node::{normalize_path, Node, NodeId, NodeKind, NodeLocation, NodeStatus};
pub use progress::{NoopSink, ProgressEvent, ProgressSink, RecordingSink, TracingSink};
pub use references::{Reference, ReferenceRule, ReferenceTable};
pub use resolver::{DefinitionRecord, DependencyResolver, ResolverConfig};
pub use source::{ArchiveReader, Definition, DefinitionIndex, MemoryIndex};
pub use source_index::{FileIssue, SourceIndex};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
