//! Collaborator interfaces for definition lookup and packed containers
//!
//! The resolver and the conflict detector only see these traits. Scanning loose
//! directories, reading containers, or serving fixtures from memory are all
//! implementations behind them.

use crate::error::{ArchiveError, SourceError};
use crate::node::{NodeKind, NodeLocation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use unitport_block::BlockParser;
use uuid::Uuid;

/// A definition (or asset) served by an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Definition name
    pub name: String,

    /// Category, from the block type for text definitions
    pub kind: NodeKind,

    /// File or container entry holding it
    pub location: NodeLocation,

    /// Block source text for definitions, raw bytes for assets
    pub bytes: Vec<u8>,

    /// Last modification time of the holding file, when known
    pub modified: Option<DateTime<Utc>>,
}

impl Definition {
    /// Byte size
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Name-to-definition lookup over a source installation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DefinitionIndex: Send + Sync {
    /// Look up a definition by name
    async fn find(&self, name: &str) -> Option<Definition>;

    /// Whether a definition with this name exists
    async fn exists(&self, name: &str) -> bool;

    /// Whole-file bytes for a location this index produced
    async fn read_location(&self, location: &NodeLocation) -> Result<Vec<u8>, SourceError>;

    /// Identity of the index contents, for caches that outlive one resolution
    ///
    /// `None` disables cross-call caching for this index.
    fn cache_key(&self) -> Option<String> {
        None
    }
}

/// Reader for packed containers
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    /// Entry paths stored in the container
    async fn list_entries(&self, container: &Path) -> Result<Vec<String>, ArchiveError>;

    /// Bytes of one entry
    async fn extract(&self, container: &Path, entry: &str) -> Result<Vec<u8>, ArchiveError>;

    /// Whether the container holds the entry
    async fn exists(&self, container: &Path, entry: &str) -> bool;
}

/// In-memory index built from definition text
///
/// Each block of an added file becomes a definition located in that file; the
/// first definition registered under a name wins.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    id: String,
    parser: BlockParser,
    definitions: HashMap<String, Definition>,
    files: HashMap<NodeLocation, Vec<u8>>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Create empty index
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parser: BlockParser::default(),
            definitions: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// Add a loose definition file
    #[must_use]
    pub fn with_file(mut self, relative_path: &str, text: &str) -> Self {
        self.insert_file(NodeLocation::loose(relative_path), text);
        self
    }

    /// Add a binary asset under a name
    #[must_use]
    pub fn with_asset(mut self, name: &str, kind: NodeKind, relative_path: &str, bytes: &[u8]) -> Self {
        let location = NodeLocation::loose(relative_path);
        self.files.insert(location.clone(), bytes.to_vec());
        self.definitions.entry(name.to_string()).or_insert(Definition {
            name: name.to_string(),
            kind,
            location,
            bytes: bytes.to_vec(),
            modified: None,
        });
        self.id = Uuid::new_v4().to_string();
        self
    }

    /// Register every block of a text file
    pub fn insert_file(&mut self, location: NodeLocation, text: &str) {
        let outcome = self.parser.parse(text);
        for block in outcome.blocks {
            self.definitions
                .entry(block.name.clone())
                .or_insert_with(|| Definition {
                    name: block.name.clone(),
                    kind: NodeKind::from_block_type(&block.block_type),
                    location: location.clone(),
                    bytes: block.source_text().into_bytes(),
                    modified: None,
                });
        }
        self.files.insert(location, text.as_bytes().to_vec());
        self.id = Uuid::new_v4().to_string();
    }

    /// Drop a definition by name
    pub fn remove(&mut self, name: &str) -> Option<Definition> {
        self.id = Uuid::new_v4().to_string();
        self.definitions.remove(name)
    }

    /// Number of definitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[async_trait]
impl DefinitionIndex for MemoryIndex {
    async fn find(&self, name: &str) -> Option<Definition> {
        self.definitions.get(name).cloned()
    }

    async fn exists(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    async fn read_location(&self, location: &NodeLocation) -> Result<Vec<u8>, SourceError> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| SourceError::UnknownLocation(location.to_string()))
    }

    fn cache_key(&self) -> Option<String> {
        Some(self.id.clone())
    }
}
