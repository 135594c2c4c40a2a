//! Unitport Block Format
//!
//! Parser for the nested, `End`-terminated text format game definitions are
//! written in.
//!
//! # Core Concepts
//!
//! - [`Block`]: One `Type Name ... End` definition with its direct fields
//! - [`BlockParser`]: Turns text into blocks plus structural [`ParseIssue`]s
//! - [`ParserVocabulary`]: Sub-block openers and definition types, replaceable by configuration
//!
//! # Example
//!
//! ```rust
//! use unitport_block::{parse, IssueKind};
//!
//! let outcome = parse("Weapon TankGun\n  PrimaryDamage = 60\nEnd\n");
//! assert_eq!(outcome.blocks[0].first_value("PrimaryDamage"), Some("60"));
//!
//! let broken = parse("Weapon TankGun\n");
//! assert_eq!(broken.issues[0].kind, IssueKind::MissingEnd);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod block;
mod error;
mod parser;
mod vocabulary;

pub use block::{Block, Field, SourceLine};
pub use error::BlockError;
pub use parser::{parse, BlockParser, IssueKind, ParseIssue, ParseOutcome};
pub use vocabulary::ParserVocabulary;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
