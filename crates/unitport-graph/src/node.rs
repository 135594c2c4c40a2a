//! Node model
//!
//! Nodes are owned flat by [`DependencyGraph`](crate::DependencyGraph) and refer to
//! their children by [`NodeId`], so reference cycles never become ownership cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

/// Stable logical identity: `<Kind>/<name>`, with a `#cycle@..` or `#depth@..`
/// suffix for terminal nodes that stand in for a re-encountered definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Identity of a definition node
    #[must_use]
    pub fn new(kind: NodeKind, name: &str) -> Self {
        Self(format!("{}/{name}", kind.as_str()))
    }

    /// Identity of the terminal node marking a cycle back to `name`
    #[must_use]
    pub fn cycle(kind: NodeKind, name: &str, parent: &NodeId) -> Self {
        Self(format!("{}/{name}#cycle@{}", kind.as_str(), parent.0))
    }

    /// Identity of the terminal node standing in past the depth bound
    #[must_use]
    pub fn depth_exceeded(kind: NodeKind, name: &str, parent: &NodeId) -> Self {
        Self(format!("{}/{name}#depth@{}", kind.as_str(), parent.0))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asset or definition category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Object,
    Weapon,
    Armor,
    FxList,
    ParticleSystem,
    Locomotor,
    CommandSet,
    CommandButton,
    Upgrade,
    SpecialPower,
    Science,
    ObjectCreationList,
    Audio,
    Model,
    Texture,
    Other,
}

impl NodeKind {
    /// Short name used in node identities
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Weapon => "Weapon",
            Self::Armor => "Armor",
            Self::FxList => "FXList",
            Self::ParticleSystem => "ParticleSystem",
            Self::Locomotor => "Locomotor",
            Self::CommandSet => "CommandSet",
            Self::CommandButton => "CommandButton",
            Self::Upgrade => "Upgrade",
            Self::SpecialPower => "SpecialPower",
            Self::Science => "Science",
            Self::ObjectCreationList => "ObjectCreationList",
            Self::Audio => "Audio",
            Self::Model => "Model",
            Self::Texture => "Texture",
            Self::Other => "Other",
        }
    }

    /// Kind of a parsed block type
    #[must_use]
    pub fn from_block_type(block_type: &str) -> Self {
        match block_type {
            "Object" | "ObjectReskin" | "ChildObject" => Self::Object,
            "Weapon" => Self::Weapon,
            "Armor" => Self::Armor,
            "FXList" => Self::FxList,
            "ParticleSystem" => Self::ParticleSystem,
            "Locomotor" => Self::Locomotor,
            "CommandSet" => Self::CommandSet,
            "CommandButton" => Self::CommandButton,
            "Upgrade" => Self::Upgrade,
            "SpecialPower" => Self::SpecialPower,
            "Science" => Self::Science,
            "ObjectCreationList" => Self::ObjectCreationList,
            "AudioEvent" => Self::Audio,
            "MappedImage" => Self::Texture,
            _ => Self::Other,
        }
    }

    /// Whether this kind is a text definition that can itself carry references
    #[inline]
    #[must_use]
    pub fn is_definition(self) -> bool {
        !matches!(self, Self::Model | Self::Texture)
    }

    /// Whether an index is expected to cover this kind
    ///
    /// Unverifiable kinds that cannot be found end up `NotVerified`, not `Missing`.
    #[inline]
    #[must_use]
    pub fn is_verifiable(self) -> bool {
        !matches!(self, Self::Model | Self::Texture | Self::Audio)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a node's bytes live
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeLocation {
    /// Loose file, path relative to the source root
    LooseFile {
        /// Relative path
        path: PathBuf,
    },

    /// Entry inside a packed container
    ContainerEntry {
        /// Container file
        container: PathBuf,
        /// Entry path as stored in the container
        entry: String,
    },
}

impl NodeLocation {
    /// Loose file location
    #[must_use]
    pub fn loose(path: impl Into<PathBuf>) -> Self {
        Self::LooseFile { path: path.into() }
    }

    /// Container entry location
    #[must_use]
    pub fn entry(container: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self::ContainerEntry {
            container: container.into(),
            entry: entry.into(),
        }
    }

    /// Installation-relative path with `/` separators
    ///
    /// Both loose files and container entries map onto the same relative layout,
    /// which is what file-overwrite detection and transfer compare against.
    #[must_use]
    pub fn relative_path(&self) -> String {
        match self {
            Self::LooseFile { path } => normalize_path(path),
            Self::ContainerEntry { entry, .. } => entry.replace('\\', "/").trim_start_matches('/').to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_container_entry(&self) -> bool {
        matches!(self, Self::ContainerEntry { .. })
    }
}

impl Display for NodeLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::LooseFile { path } => write!(f, "{}", path.display()),
            Self::ContainerEntry { container, entry } => {
                write!(f, "{} :: {entry}", container.display())
            }
        }
    }
}

/// Join normal path components with `/`
#[must_use]
pub fn normalize_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolution status of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    Unknown,

    /// Exists and its whole closure was found
    Found,

    /// Definition could not be found
    Missing,

    /// Cycle back-reference or depth bound exceeded
    Invalid,

    /// Existence unknown, or closure incomplete, with no hard failure here
    NotVerified,
}

impl NodeStatus {
    #[inline]
    #[must_use]
    pub fn is_found(self) -> bool {
        matches!(self, Self::Found)
    }
}

/// One node of a resolved graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Logical identity
    pub id: NodeId,

    /// Definition or asset name
    pub name: String,

    /// Category
    pub kind: NodeKind,

    /// Location when the definition exists
    pub location: Option<NodeLocation>,

    /// Resolution status
    pub status: NodeStatus,

    /// Shortest distance from the root
    pub depth: usize,

    /// Child identities in reference order
    pub children: Vec<NodeId>,

    /// Byte size of the definition or asset
    pub size: Option<u64>,

    /// Last modification time, when known
    pub modified: Option<DateTime<Utc>>,

    /// Why the node is Invalid or NotVerified
    pub reason: Option<String>,
}

impl Node {
    /// Create a node with no children
    #[must_use]
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            location: None,
            status: NodeStatus::Unknown,
            depth: 0,
            children: Vec::new(),
            size: None,
            modified: None,
            reason: None,
        }
    }

    /// Whether the node's own definition exists
    #[inline]
    #[must_use]
    pub fn exists(&self) -> bool {
        self.location.is_some()
    }
}
