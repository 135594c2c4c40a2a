//! Conflict detection
//!
//! Compares the names and files of a resolved closure against a
//! [`TargetIndex`]. Conflicts are decision points, not errors.

use crate::error::ConflictError;
use crate::rename::RenameGenerator;
use crate::target::TargetIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use unitport_block::ParserVocabulary;
use unitport_graph::{DependencyGraph, NodeKind, ProgressEvent, ProgressSink};

/// Conflict classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Same name and same type already defined in the target
    Duplicate,

    /// Same name defined in the target under a different type
    NameCollision,

    /// A closure file's relative path already exists in the target
    FileOverwrite,
}

impl ConflictKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::NameCollision => "name_collision",
            Self::FileOverwrite => "file_overwrite",
        }
    }
}

impl Display for ConflictKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Definition name, or the relative path for file conflicts
    pub name: String,

    /// Kind of the source definition (shallowest definition for files)
    pub kind: NodeKind,

    /// Conflict classification
    pub conflict: ConflictKind,

    /// Relative path of the source file holding the definition
    pub relative_path: Option<String>,

    /// Block type of the existing target definition, for name conflicts
    pub existing_type: Option<String>,

    /// Existing target path for the name or file
    pub existing_path: Option<String>,

    /// Definitions stored in the conflicting file
    pub definitions: Vec<String>,

    /// Generated rename for name conflicts
    pub rename: Option<String>,
}

impl ConflictEntry {
    /// Stable key callers use to address decisions
    #[must_use]
    pub fn key(&self) -> String {
        match self.conflict {
            ConflictKind::FileOverwrite => format!("file:{}", self.name),
            _ => format!("name:{}", self.name),
        }
    }

    /// Whether the conflicting file is a text definition file
    #[must_use]
    pub fn is_text_file(&self) -> bool {
        self.relative_path
            .as_deref()
            .is_some_and(|p| p.to_ascii_lowercase().ends_with(".ini"))
    }
}

impl Display for ConflictEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.conflict, self.name, self.kind)?;
        if let Some(rename) = &self.rename {
            write!(f, " -> {rename}")?;
        }
        Ok(())
    }
}

/// Every conflict found for one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Root unit name
    pub unit: String,

    /// Conflicts in detection order: names first, then files
    pub entries: Vec<ConflictEntry>,
}

impl ConflictReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of conflicts of one kind
    #[must_use]
    pub fn count(&self, kind: ConflictKind) -> usize {
        self.entries.iter().filter(|e| e.conflict == kind).count()
    }

    /// Counts per kind
    #[must_use]
    pub fn counts(&self) -> BTreeMap<ConflictKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.conflict).or_insert(0) += 1;
        }
        counts
    }

    /// Conflict by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConflictEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Generated renames, old name to new name
    #[must_use]
    pub fn renames(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|e| e.rename.as_ref().map(|r| (e.name.clone(), r.clone())))
            .collect()
    }
}

/// Detects conflicts between a closure and a target
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    renamer: RenameGenerator,
}

impl ConflictDetector {
    #[inline]
    #[must_use]
    pub fn new(renamer: RenameGenerator) -> Self {
        Self { renamer }
    }

    #[inline]
    #[must_use]
    pub fn renamer(&self) -> &RenameGenerator {
        &self.renamer
    }

    /// Scan `target_root` and detect conflicts against it
    ///
    /// # Errors
    /// Returns an error if the target cannot be scanned.
    pub async fn detect_at(
        &self,
        graph: &DependencyGraph,
        target_root: &Path,
        vocabulary: ParserVocabulary,
        sink: &dyn ProgressSink,
    ) -> Result<(TargetIndex, ConflictReport), ConflictError> {
        let target = TargetIndex::scan(target_root, vocabulary).await?;
        let report = self.detect(graph, &target, sink);
        Ok((target, report))
    }

    /// Detect conflicts against an indexed target
    ///
    /// Every node that exists in the source is checked, so definitions whose
    /// own closure is incomplete are still caught before they are transferred.
    #[tracing::instrument(skip_all, fields(root = %graph.root()))]
    pub fn detect(&self, graph: &DependencyGraph, target: &TargetIndex, sink: &dyn ProgressSink) -> ConflictReport {
        sink.emit(ProgressEvent::TargetScanned {
            definitions: target.definition_count(),
            files: target.file_count(),
        });

        let mut taken: HashSet<String> = target.names();
        taken.extend(graph.nodes().map(|n| n.name.clone()));

        let mut report = ConflictReport {
            unit: graph.root_node().map(|n| n.name.clone()).unwrap_or_default(),
            entries: Vec::new(),
        };
        let mut seen_names = HashSet::new();

        for node in graph.nodes_by_depth().into_iter().flatten() {
            if !node.exists() || !node.kind.is_definition() || !seen_names.insert(node.name.clone()) {
                continue;
            }
            let Some(existing) = target.definition(&node.name) else {
                continue;
            };

            let conflict = if NodeKind::from_block_type(&existing.block_type) == node.kind {
                ConflictKind::Duplicate
            } else {
                ConflictKind::NameCollision
            };
            let rename = self.renamer.generate(&node.name, |n| taken.contains(n));
            taken.insert(rename.clone());

            report.entries.push(ConflictEntry {
                name: node.name.clone(),
                kind: node.kind,
                conflict,
                relative_path: node.location.as_ref().map(unitport_graph::NodeLocation::relative_path),
                existing_type: Some(existing.block_type.clone()),
                existing_path: Some(existing.relative_path.clone()),
                definitions: vec![node.name.clone()],
                rename: Some(rename),
            });
        }

        for file in graph.files() {
            let relative = file.location.relative_path();
            let Some(existing) = target.existing_path(&relative) else {
                continue;
            };
            let kind = file
                .definitions
                .first()
                .and_then(|name| graph.find_by_name(name))
                .map_or(NodeKind::Other, |n| n.kind);

            report.entries.push(ConflictEntry {
                name: relative.clone(),
                kind,
                conflict: ConflictKind::FileOverwrite,
                relative_path: Some(relative),
                existing_type: None,
                existing_path: Some(existing.to_string()),
                definitions: file.definitions.clone(),
                rename: None,
            });
        }

        for entry in &report.entries {
            sink.emit(ProgressEvent::ConflictFound {
                name: entry.name.clone(),
                kind: entry.conflict.to_string(),
            });
        }
        tracing::info!(
            conflicts = report.len(),
            duplicates = report.count(ConflictKind::Duplicate),
            collisions = report.count(ConflictKind::NameCollision),
            overwrites = report.count(ConflictKind::FileOverwrite),
            "conflict detection finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitport_graph::{DependencyResolver, MemoryIndex, NoopSink};

    async fn graph() -> DependencyGraph {
        let index = MemoryIndex::new()
            .with_file("Data/INI/Object/Tank.ini", "Object Tank\n  Weapon = TankGun\n  Armor = TankArmor\nEnd\n")
            .with_file("Data/INI/Weapon.ini", "Weapon TankGun\nEnd\n")
            .with_file("Data/INI/Armor.ini", "Armor TankArmor\nEnd\n");
        DependencyResolver::default().resolve("Tank", &index, &NoopSink).await
    }

    #[tokio::test]
    async fn classifies_name_and_file_conflicts() {
        let target = TargetIndex::new()
            .with_definition("TankGun", "Weapon", "Data/INI/Weapon.ini")
            .with_definition("TankArmor", "Object", "Data/INI/Object/Other.ini")
            .with_file("Data/INI/Weapon.ini");

        let report = ConflictDetector::default().detect(&graph().await, &target, &NoopSink);

        assert_eq!(report.count(ConflictKind::Duplicate), 1);
        assert_eq!(report.count(ConflictKind::NameCollision), 1);
        assert_eq!(report.count(ConflictKind::FileOverwrite), 1);

        let dup = report.get("name:TankGun").unwrap();
        assert_eq!(dup.rename.as_deref(), Some("ZH_TankGun"));
        let file = report.get("file:Data/INI/Weapon.ini").unwrap();
        assert!(file.rename.is_none());
        assert!(file.is_text_file());
    }

    #[tokio::test]
    async fn renames_avoid_names_in_either_installation() {
        let target = TargetIndex::new()
            .with_definition("Tank", "Object", "a.ini")
            .with_definition("ZH_Tank", "Object", "b.ini");

        let report = ConflictDetector::default().detect(&graph().await, &target, &NoopSink);

        assert_eq!(report.renames().get("Tank").map(String::as_str), Some("ZH_Tank_2"));
    }

    #[tokio::test]
    async fn empty_target_is_clean() {
        let report = ConflictDetector::default().detect(&graph().await, &TargetIndex::new(), &NoopSink);
        assert!(report.is_clean());
        assert_eq!(report.unit, "Tank");
    }
}
