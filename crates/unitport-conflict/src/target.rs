//! Target installation index
//!
//! Two views of the installation a unit is being merged into: the definition
//! names declared by recognized block headers in its text files, and the set of
//! relative file paths that already exist. Paths compare case-insensitively,
//! matching how the game resolves them.

use crate::error::ConflictError;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use unitport_block::{BlockParser, ParserVocabulary};
use unitport_graph::normalize_path;
use walkdir::WalkDir;

/// Definition declared in the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefinition {
    /// Definition name
    pub name: String,

    /// Block type of the header
    pub block_type: String,

    /// File declaring it, relative to the target root
    pub relative_path: String,
}

/// Index of a target installation
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    root: Option<PathBuf>,
    definitions: HashMap<String, TargetDefinition>,
    files: HashMap<String, String>,
}

impl TargetIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a definition
    #[must_use]
    pub fn with_definition(mut self, name: &str, block_type: &str, relative_path: &str) -> Self {
        self.insert_definition(TargetDefinition {
            name: name.to_string(),
            block_type: block_type.to_string(),
            relative_path: relative_path.to_string(),
        });
        self
    }

    /// Record an existing file
    #[must_use]
    pub fn with_file(mut self, relative_path: &str) -> Self {
        self.insert_file(relative_path);
        self
    }

    fn insert_definition(&mut self, definition: TargetDefinition) {
        self.definitions
            .entry(definition.name.clone())
            .or_insert(definition);
    }

    fn insert_file(&mut self, relative_path: &str) {
        self.files
            .insert(file_key(relative_path), relative_path.to_string());
    }

    /// Walk `root`, parsing every `*.ini` file on the rayon pool
    ///
    /// Hidden directories (including the migration journal) are skipped.
    /// Unreadable files are logged and left out of the definition view.
    ///
    /// # Errors
    /// Returns an error if `root` is not a directory or the scan task panics.
    #[tracing::instrument(skip(vocabulary), fields(root = %root.display()))]
    pub async fn scan(root: &Path, vocabulary: ParserVocabulary) -> Result<Self, ConflictError> {
        if !root.is_dir() {
            return Err(ConflictError::InvalidRoot(root.to_path_buf()));
        }
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Self::scan_blocking(&root, &vocabulary))
            .await
            .map_err(|e| ConflictError::Task(e.to_string()))
    }

    fn scan_blocking(root: &Path, vocabulary: &ParserVocabulary) -> Self {
        let mut index = Self {
            root: Some(root.to_path_buf()),
            ..Self::default()
        };

        let mut text_files = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = normalize_path(relative);
            if relative.to_ascii_lowercase().ends_with(".ini") {
                text_files.push((entry.path().to_path_buf(), relative.clone()));
            }
            index.insert_file(&relative);
        }

        let parser = BlockParser::new(vocabulary.clone());
        let definitions: Vec<TargetDefinition> = text_files
            .par_iter()
            .flat_map_iter(|(path, relative)| {
                let text = match std::fs::read(path) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable target file");
                        String::new()
                    }
                };
                parser
                    .parse(&text)
                    .blocks
                    .into_iter()
                    .filter(|b| parser.vocabulary().is_definition_type(&b.block_type))
                    .map(|b| TargetDefinition {
                        name: b.name,
                        block_type: b.block_type,
                        relative_path: relative.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for definition in definitions {
            index.insert_definition(definition);
        }

        tracing::info!(
            definitions = index.definitions.len(),
            files = index.files.len(),
            "target indexed"
        );
        index
    }

    /// Root this index was scanned from
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Definition declared under `name`
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&TargetDefinition> {
        self.definitions.get(name)
    }

    /// Whether any definition uses `name`
    #[inline]
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Whether the relative path already exists, ignoring case
    #[inline]
    #[must_use]
    pub fn has_file(&self, relative_path: &str) -> bool {
        self.files.contains_key(&file_key(relative_path))
    }

    /// Existing spelling of a relative path
    #[must_use]
    pub fn existing_path(&self, relative_path: &str) -> Option<&str> {
        self.files.get(&file_key(relative_path)).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Snapshot of used names, for rename generation
    #[must_use]
    pub fn names(&self) -> HashSet<String> {
        self.definitions.keys().cloned().collect()
    }
}

fn file_key(relative_path: &str) -> String {
    relative_path
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_collects_definitions_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("Data/INI/Object");
        std::fs::create_dir_all(&ini).unwrap();
        std::fs::write(
            ini.join("Tank.ini"),
            "Object Tank\n  BuildCost = 800\nEnd\nGameData\nEnd\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();
        std::fs::create_dir_all(dir.path().join(".unitport/journal")).unwrap();
        std::fs::write(dir.path().join(".unitport/journal/a.json"), "{}").unwrap();

        let index = TargetIndex::scan(dir.path(), ParserVocabulary::default())
            .await
            .unwrap();

        assert_eq!(index.definition_count(), 1);
        assert_eq!(index.definition("Tank").unwrap().relative_path, "Data/INI/Object/Tank.ini");
        assert_eq!(index.file_count(), 2);
        assert!(index.has_file("data\\ini\\object\\TANK.INI"));
        assert!(!index.has_file(".unitport/journal/a.json"));
    }

    #[tokio::test]
    async fn scan_rejects_missing_root() {
        let err = TargetIndex::scan(Path::new("/no/such/target"), ParserVocabulary::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidRoot(_)));
    }

    #[tokio::test]
    async fn scan_resolves_duplicate_names_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        for (file, block_type) in [("Zeta.ini", "Object"), ("Alpha.ini", "Weapon"), ("Mid.ini", "Armor")] {
            std::fs::write(dir.path().join(file), format!("{block_type} Gun\nEnd\n")).unwrap();
        }

        for _ in 0..3 {
            let index = TargetIndex::scan(dir.path(), ParserVocabulary::default())
                .await
                .unwrap();
            let gun = index.definition("Gun").unwrap();
            assert_eq!(gun.relative_path, "Alpha.ini");
            assert_eq!(gun.block_type, "Weapon");
        }
    }

    #[test]
    fn builder_first_definition_wins() {
        let index = TargetIndex::new()
            .with_definition("Gun", "Weapon", "a.ini")
            .with_definition("Gun", "Object", "b.ini");
        assert_eq!(index.definition("Gun").unwrap().block_type, "Weapon");
    }
}
