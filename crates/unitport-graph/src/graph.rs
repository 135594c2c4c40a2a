//! Resolved dependency graph
//!
//! An arena of [`Node`]s keyed by [`NodeId`]. Immutable once the resolver hands
//! it out.

use crate::node::{Node, NodeId, NodeLocation, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// A file that belongs to the dependency closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureFile {
    /// Where the bytes come from
    pub location: NodeLocation,

    /// Shallowest depth of any node stored in this file
    pub depth: usize,

    /// Names of the nodes stored in this file
    pub definitions: Vec<String>,
}

/// Flat dependency graph rooted at one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    root: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    max_depth: usize,
    found: usize,
    missing: usize,
}

impl DependencyGraph {
    /// Build a graph from its nodes, recomputing depths from `root`
    ///
    /// Each node's depth becomes its shortest distance from the root, so the
    /// result does not depend on the order nodes were produced in.
    #[must_use]
    pub fn from_nodes(root: NodeId, nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut nodes: BTreeMap<NodeId, Node> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        if nodes.contains_key(&root) {
            seen.insert(root.clone());
            queue.push_back((root.clone(), 0usize));
        }
        while let Some((id, depth)) = queue.pop_front() {
            let children = match nodes.get_mut(&id) {
                Some(node) => {
                    node.depth = depth;
                    node.children.clone()
                }
                None => continue,
            };
            for child in children {
                if seen.insert(child.clone()) {
                    queue.push_back((child, depth + 1));
                }
            }
        }

        let max_depth = nodes.values().map(|n| n.depth).max().unwrap_or(0);
        let found = nodes.values().filter(|n| n.status == NodeStatus::Found).count();
        let missing = nodes
            .values()
            .filter(|n| n.status == NodeStatus::Missing)
            .count();

        Self {
            root,
            nodes,
            max_depth,
            found,
            missing,
        }
    }

    /// Graph with no nodes
    #[must_use]
    pub fn empty(root: NodeId) -> Self {
        Self::from_nodes(root, std::iter::empty())
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// Root node, when the graph is not empty
    #[must_use]
    pub fn root_node(&self) -> Option<&Node> {
        self.nodes.get(&self.root)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// First node with the given name
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// All nodes in identity order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Children of a node
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|c| self.nodes.get(c))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.found
    }

    #[inline]
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    /// Completion percentage, `100 * found / total`; 0 for an empty graph
    #[must_use]
    pub fn completion(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.found as f64 / self.nodes.len() as f64;
        ratio * 100.0
    }

    /// Nodes with a given status
    pub fn with_status(&self, status: NodeStatus) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.status == status)
    }

    /// Nodes whose definition could not be found
    pub fn missing(&self) -> impl Iterator<Item = &Node> {
        self.with_status(NodeStatus::Missing)
    }

    /// Cycle and depth-bound terminal nodes
    pub fn invalid(&self) -> impl Iterator<Item = &Node> {
        self.with_status(NodeStatus::Invalid)
    }

    /// Nodes grouped by depth, shallowest first
    #[must_use]
    pub fn nodes_by_depth(&self) -> Vec<Vec<&Node>> {
        let mut levels: Vec<Vec<&Node>> = vec![Vec::new(); self.max_depth + 1];
        if self.nodes.is_empty() {
            return Vec::new();
        }
        for node in self.nodes.values() {
            levels[node.depth].push(node);
        }
        levels
    }

    /// Distinct files holding existing nodes, shallowest first
    ///
    /// Ties are broken by relative path so the order is deterministic.
    #[must_use]
    pub fn files(&self) -> Vec<ClosureFile> {
        let mut files: BTreeMap<NodeLocation, ClosureFile> = BTreeMap::new();
        for node in self.nodes.values() {
            let Some(location) = &node.location else {
                continue;
            };
            let entry = files
                .entry(location.clone())
                .or_insert_with(|| ClosureFile {
                    location: location.clone(),
                    depth: node.depth,
                    definitions: Vec::new(),
                });
            entry.depth = entry.depth.min(node.depth);
            if !entry.definitions.contains(&node.name) {
                entry.definitions.push(node.name.clone());
            }
        }

        let mut files: Vec<ClosureFile> = files.into_values().collect();
        files.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.location.relative_path().cmp(&b.location.relative_path()))
        });
        files
    }
}
