//! Dependency closure resolution
//!
//! Resolution runs in two phases:
//!
//! 1. **Discovery** fetches and parses every reachable definition exactly once.
//!    Children of a node are walked with bounded fan-out: the first
//!    `fan_out` concurrently, the rest one after another. A `seen` map keyed by
//!    name (holding the shallowest depth reached) guarantees termination.
//! 2. **Assembly** builds the node arena by depth-first search over the
//!    discovered records. The "currently resolving" set detects cycles, and a
//!    memo by name shares diamond dependencies. The depth bound is checked
//!    against the shallowest depth discovery saw for each name. Depths are
//!    then recomputed by BFS when the graph is built.
//!
//! Assembly never touches the index, so the graph only depends on what the
//! index returned, not on the order concurrent fetches completed in.

use crate::graph::DependencyGraph;
use crate::node::{Node, NodeId, NodeKind, NodeLocation, NodeStatus};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::references::{Reference, ReferenceTable};
use crate::source::DefinitionIndex;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use moka::future::Cache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use unitport_block::{BlockParser, ParserVocabulary};

/// Resolver bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deepest path walked from the root
    pub max_depth: usize,

    /// Children of one node fetched concurrently
    pub fan_out: usize,

    /// Parsed definitions kept across resolutions
    pub cache_capacity: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            fan_out: 4,
            cache_capacity: 10_000,
        }
    }
}

impl ResolverConfig {
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// What discovery learned about one name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRecord {
    /// Looked-up name
    pub name: String,

    /// Kind of the definition, when found
    pub kind: Option<NodeKind>,

    /// Where it lives, when found
    pub location: Option<NodeLocation>,

    /// Direct references in field order
    pub references: Vec<Reference>,

    /// Byte size of the definition or asset
    pub size: Option<u64>,

    /// Modification time of the holding file
    pub modified: Option<DateTime<Utc>>,
}

impl DefinitionRecord {
    fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            location: None,
            references: Vec::new(),
            size: None,
            modified: None,
        }
    }

    /// Whether the index had the definition
    #[inline]
    #[must_use]
    pub fn exists(&self) -> bool {
        self.location.is_some()
    }
}

type CacheKey = (String, String);

/// Builds dependency graphs from a [`DefinitionIndex`]
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    config: ResolverConfig,
    references: ReferenceTable,
    parser: BlockParser,
    cache: Cache<CacheKey, Arc<DefinitionRecord>>,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(
            ResolverConfig::default(),
            ReferenceTable::default(),
            ParserVocabulary::default(),
        )
    }
}

impl DependencyResolver {
    /// Create resolver
    #[must_use]
    pub fn new(config: ResolverConfig, references: ReferenceTable, vocabulary: ParserVocabulary) -> Self {
        Self {
            cache: Cache::new(config.cache_capacity),
            config,
            references,
            parser: BlockParser::new(vocabulary),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Parsed definitions currently cached across resolutions
    #[inline]
    #[must_use]
    pub fn cached_definitions(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop every cached definition
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Resolve the dependency closure of `root`
    ///
    /// Never fails: absent definitions become `Missing` nodes, cycles and
    /// paths past the depth bound become `Invalid` nodes.
    #[tracing::instrument(skip(self, index, sink), fields(max_depth = self.config.max_depth))]
    pub async fn resolve(
        &self,
        root: &str,
        index: &dyn DefinitionIndex,
        sink: &dyn ProgressSink,
    ) -> DependencyGraph {
        sink.emit(ProgressEvent::Stage {
            name: "resolve".to_string(),
        });

        let discovery = Discovery {
            resolver: self,
            index,
            sink,
            cache_key: index.cache_key(),
            seen: Mutex::new(HashMap::new()),
            records: DashMap::new(),
        };
        discovery.visit(root.to_string(), 0).await;
        tracing::debug!(definitions = discovery.records.len(), "discovery finished");

        let shortest = std::mem::take(&mut *discovery.seen.lock());
        let assembly = Assembly {
            records: &discovery.records,
            shortest,
            max_depth: self.config.max_depth,
            memo: DashMap::new(),
            resolving: Mutex::new(HashSet::new()),
            nodes: DashMap::new(),
        };
        let root_id = assembly.build(root, NodeKind::Object, None, 0);
        let graph = DependencyGraph::from_nodes(root_id, assembly.nodes.into_iter().map(|(_, n)| n));

        for node in graph.nodes() {
            sink.emit(ProgressEvent::NodeResolved {
                name: node.name.clone(),
                status: node.status,
                depth: node.depth,
            });
        }
        sink.emit(ProgressEvent::ResolutionFinished {
            root: root.to_string(),
            nodes: graph.len(),
            found: graph.found_count(),
            missing: graph.missing_count(),
        });
        tracing::info!(
            root,
            nodes = graph.len(),
            found = graph.found_count(),
            missing = graph.missing_count(),
            max_depth = graph.max_depth(),
            "resolution finished"
        );
        graph
    }

    async fn load(&self, name: &str, index: &dyn DefinitionIndex) -> DefinitionRecord {
        let Some(definition) = index.find(name).await else {
            return DefinitionRecord::missing(name);
        };

        let references = if definition.kind.is_definition() {
            let text = String::from_utf8_lossy(&definition.bytes);
            let outcome = self.parser.parse(&text);
            outcome
                .find_by_name(name)
                .or_else(|| outcome.blocks.first())
                .map(|block| self.references.extract(block))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        DefinitionRecord {
            name: name.to_string(),
            kind: Some(definition.kind),
            size: Some(definition.size()),
            location: Some(definition.location),
            references,
            modified: definition.modified,
        }
    }
}

/// Phase one state, scoped to a single `resolve` call
struct Discovery<'a> {
    resolver: &'a DependencyResolver,
    index: &'a dyn DefinitionIndex,
    sink: &'a dyn ProgressSink,
    cache_key: Option<String>,
    seen: Mutex<HashMap<String, usize>>,
    records: DashMap<String, Arc<DefinitionRecord>>,
}

impl Discovery<'_> {
    fn visit(&self, name: String, depth: usize) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            {
                let mut seen = self.seen.lock();
                if seen.get(&name).is_some_and(|&d| d <= depth) {
                    return;
                }
                seen.insert(name.clone(), depth);
            }

            let record = self.fetch(&name).await;
            if depth >= self.resolver.config.max_depth {
                return;
            }

            let children: Vec<String> = record.references.iter().map(|r| r.name.clone()).collect();
            let split = self.resolver.config.fan_out.max(1).min(children.len());
            let (concurrent, sequential) = children.split_at(split);

            join_all(concurrent.iter().map(|child| self.visit(child.clone(), depth + 1))).await;
            for child in sequential {
                self.visit(child.clone(), depth + 1).await;
            }
        })
    }

    async fn fetch(&self, name: &str) -> Arc<DefinitionRecord> {
        if let Some(record) = self.records.get(name) {
            return Arc::clone(record.value());
        }

        let key = self.cache_key.as_ref().map(|k| (k.clone(), name.to_string()));
        let cached = match &key {
            Some(key) => self.resolver.cache.get(key).await,
            None => None,
        };

        let record = match cached {
            Some(record) => record,
            None => {
                let record = Arc::new(self.resolver.load(name, self.index).await);
                if let Some(key) = key {
                    self.resolver.cache.insert(key, Arc::clone(&record)).await;
                }
                self.sink.emit(ProgressEvent::DefinitionFetched {
                    name: name.to_string(),
                    found: record.exists(),
                });
                record
            }
        };

        self.records.insert(name.to_string(), Arc::clone(&record));
        record
    }
}

/// Phase two state
struct Assembly<'a> {
    records: &'a DashMap<String, Arc<DefinitionRecord>>,

    /// Shortest depth discovery reached each name at
    shortest: HashMap<String, usize>,
    max_depth: usize,
    memo: DashMap<String, NodeId>,
    resolving: Mutex<HashSet<String>>,
    nodes: DashMap<NodeId, Node>,
}

impl Assembly<'_> {
    fn build(&self, name: &str, reference_kind: NodeKind, parent: Option<&NodeId>, depth: usize) -> NodeId {
        if let Some(id) = self.memo.get(name) {
            return id.clone();
        }

        let record = self.records.get(name).map(|r| Arc::clone(r.value()));
        let kind = record.as_ref().and_then(|r| r.kind).unwrap_or(reference_kind);

        // Memoized nodes are shared by every path, so bound them by the shortest one.
        let depth = self.shortest.get(name).map_or(depth, |&shortest| shortest.min(depth));

        if let Some(parent) = parent {
            if depth > self.max_depth {
                return self.terminal(
                    NodeId::depth_exceeded(kind, name, parent),
                    name,
                    kind,
                    format!("depth bound {} exceeded", self.max_depth),
                );
            }
        }

        let entered = self.resolving.lock().insert(name.to_string());
        if !entered {
            let parent = parent.cloned().unwrap_or_else(|| NodeId::new(kind, name));
            return self.terminal(
                NodeId::cycle(kind, name, &parent),
                name,
                kind,
                format!("cycle back to {name}"),
            );
        }

        let id = NodeId::new(kind, name);
        let mut node = Node::new(id.clone(), name, kind);

        match record.as_deref() {
            Some(record) if record.exists() => {
                node.location.clone_from(&record.location);
                node.size = record.size;
                node.modified = record.modified;

                for reference in &record.references {
                    let child = self.build(&reference.name, reference.kind, Some(&id), depth + 1);
                    if !node.children.contains(&child) {
                        node.children.push(child);
                    }
                }

                let complete = node
                    .children
                    .iter()
                    .all(|c| self.nodes.get(c).is_some_and(|n| n.status.is_found()));
                if complete {
                    node.status = NodeStatus::Found;
                } else {
                    node.status = NodeStatus::NotVerified;
                    node.reason = Some("closure incomplete".to_string());
                }
            }
            Some(_) if kind.is_verifiable() => {
                node.status = NodeStatus::Missing;
                node.reason = Some("definition not found".to_string());
            }
            Some(_) => {
                node.status = NodeStatus::NotVerified;
                node.reason = Some("asset not indexed".to_string());
            }
            None => {
                node.status = NodeStatus::NotVerified;
                node.reason = Some("not reached by discovery".to_string());
            }
        }

        self.resolving.lock().remove(name);
        self.nodes.insert(id.clone(), node);
        self.memo.insert(name.to_string(), id.clone());
        id
    }

    fn terminal(&self, id: NodeId, name: &str, kind: NodeKind, reason: String) -> NodeId {
        tracing::debug!(node = %id, %reason, "terminal node");
        let mut node = Node::new(id.clone(), name, kind);
        node.status = NodeStatus::Invalid;
        node.reason = Some(reason);
        self.nodes.insert(id.clone(), node);
        id
    }
}
