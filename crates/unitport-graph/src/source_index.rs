//! Definition index over a source installation
//!
//! Indexes loose `*.ini` files under a root directory and the text entries of
//! any number of packed containers. Loose files take precedence over container
//! entries; among containers the first listed wins. Non-text files are indexed
//! as assets by file stem.

use crate::error::SourceError;
use crate::node::{normalize_path, NodeKind, NodeLocation};
use crate::source::{ArchiveReader, Definition, DefinitionIndex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unitport_block::{BlockParser, ParseIssue, ParseOutcome, ParserVocabulary};
use uuid::Uuid;
use walkdir::WalkDir;

/// A text file waiting to be parsed
struct TextFile {
    location: NodeLocation,
    text: String,
    modified: Option<DateTime<Utc>>,
}

/// Asset entry keyed by lowercase stem
#[derive(Debug, Clone)]
struct AssetEntry {
    name: String,
    kind: NodeKind,
    location: NodeLocation,
    modified: Option<DateTime<Utc>>,
}

/// Structural issue reported for one indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIssue {
    /// File the issue was found in
    pub location: NodeLocation,

    /// The issue
    pub issue: ParseIssue,
}

/// Scanned source installation
pub struct SourceIndex {
    id: String,
    root: PathBuf,
    archives: Arc<dyn ArchiveReader>,
    definitions: HashMap<String, Definition>,
    assets: HashMap<String, AssetEntry>,
    issues: Vec<FileIssue>,
}

impl std::fmt::Debug for SourceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceIndex")
            .field("root", &self.root)
            .field("definitions", &self.definitions.len())
            .field("assets", &self.assets.len())
            .field("issues", &self.issues.len())
            .finish_non_exhaustive()
    }
}

impl SourceIndex {
    /// Scan a loose root and a list of containers
    ///
    /// # Errors
    /// Returns an error if the root is not a directory or a container cannot be
    /// listed. Unreadable loose files are skipped with a warning.
    #[tracing::instrument(skip(archives, vocabulary), fields(root = %root.display()))]
    pub async fn scan(
        root: &Path,
        containers: &[PathBuf],
        archives: Arc<dyn ArchiveReader>,
        vocabulary: ParserVocabulary,
    ) -> Result<Self, SourceError> {
        if !root.is_dir() {
            return Err(SourceError::InvalidRoot(root.to_path_buf()));
        }

        let loose_root = root.to_path_buf();
        let (mut texts, mut assets) = tokio::task::spawn_blocking(move || collect_loose(&loose_root))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?;

        for container in containers {
            let modified = modified_time(container);
            for entry in archives.list_entries(container).await? {
                let location = NodeLocation::entry(container, entry.clone());
                if is_text_entry(&entry) {
                    let bytes = archives.extract(container, &entry).await?;
                    texts.push(TextFile {
                        location,
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        modified,
                    });
                } else if let Some(asset) = asset_entry(&location.relative_path(), location.clone(), modified) {
                    assets.entry(asset.name.to_ascii_lowercase()).or_insert(asset);
                }
            }
        }

        let parser = BlockParser::new(vocabulary);
        let parsed: Vec<(TextFile, ParseOutcome)> = texts
            .into_par_iter()
            .map(|file| {
                let outcome = parser.parse(&file.text);
                (file, outcome)
            })
            .collect();

        let mut definitions = HashMap::new();
        let mut issues = Vec::new();
        for (file, outcome) in parsed {
            for issue in outcome.issues {
                tracing::debug!(location = %file.location, %issue, "parse issue");
                issues.push(FileIssue {
                    location: file.location.clone(),
                    issue,
                });
            }
            for block in outcome.blocks {
                if !parser.vocabulary().is_definition_type(&block.block_type) {
                    continue;
                }
                definitions.entry(block.name.clone()).or_insert_with(|| Definition {
                    name: block.name.clone(),
                    kind: NodeKind::from_block_type(&block.block_type),
                    location: file.location.clone(),
                    bytes: block.source_text().into_bytes(),
                    modified: file.modified,
                });
            }
        }

        tracing::info!(
            definitions = definitions.len(),
            assets = assets.len(),
            issues = issues.len(),
            "source index built"
        );

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            root: root.to_path_buf(),
            archives,
            definitions,
            assets,
            issues,
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of text definitions
    #[inline]
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Number of indexed assets
    #[inline]
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Structural issues found while indexing
    #[must_use]
    pub fn issues(&self) -> &[FileIssue] {
        &self.issues
    }

    /// Names of all text definitions
    pub fn definition_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

#[async_trait]
impl DefinitionIndex for SourceIndex {
    async fn find(&self, name: &str) -> Option<Definition> {
        if let Some(def) = self.definitions.get(name) {
            return Some(def.clone());
        }
        let asset = self.assets.get(&name.to_ascii_lowercase())?;
        match self.read_location(&asset.location).await {
            Ok(bytes) => Some(Definition {
                name: asset.name.clone(),
                kind: asset.kind,
                location: asset.location.clone(),
                bytes,
                modified: asset.modified,
            }),
            Err(e) => {
                tracing::warn!(name, error = %e, "indexed asset unreadable");
                None
            }
        }
    }

    async fn exists(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.assets.contains_key(&name.to_ascii_lowercase())
    }

    async fn read_location(&self, location: &NodeLocation) -> Result<Vec<u8>, SourceError> {
        match location {
            NodeLocation::LooseFile { path } => {
                let full = self.root.join(path);
                tokio::fs::read(&full)
                    .await
                    .map_err(|e| SourceError::io_error(full, e))
            }
            NodeLocation::ContainerEntry { container, entry } => {
                Ok(self.archives.extract(container, entry).await?)
            }
        }
    }

    fn cache_key(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

fn collect_loose(root: &Path) -> (Vec<TextFile>, HashMap<String, AssetEntry>) {
    let mut texts = Vec::new();
    let mut assets = HashMap::new();

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
        let location = NodeLocation::loose(relative);
        let modified = modified_time(entry.path());
        let rel = normalize_path(relative);

        if is_text_entry(&rel) {
            match std::fs::read(entry.path()) {
                Ok(bytes) => texts.push(TextFile {
                    location,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                    modified,
                }),
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file"),
            }
        } else if let Some(asset) = asset_entry(&rel, location, modified) {
            assets.entry(asset.name.to_ascii_lowercase()).or_insert(asset);
        }
    }

    (texts, assets)
}

fn is_text_entry(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".ini")
}

fn asset_entry(relative: &str, location: NodeLocation, modified: Option<DateTime<Utc>>) -> Option<AssetEntry> {
    let file_name = relative.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    let kind = match ext.to_ascii_lowercase().as_str() {
        "w3d" => NodeKind::Model,
        "dds" | "tga" => NodeKind::Texture,
        "wav" | "mp3" => NodeKind::Audio,
        _ => return None,
    };
    Some(AssetEntry {
        name: stem.to_string(),
        kind,
        location,
        modified,
    })
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{encode_big, BigArchiveReader};

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn indexes_loose_definitions_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Data/INI/Object/Tank.ini", b"Object Tank\n  Weapon = TankGun\nEnd\n");
        write(dir.path(), "Data/INI/Weapon.ini", b"Weapon TankGun\nEnd\nGameData\nEnd\n");
        write(dir.path(), "Art/W3D/AVTank.W3D", &[0, 1, 2]);
        write(dir.path(), ".unitport/journal/x.json", b"{}");

        let index = SourceIndex::scan(
            dir.path(),
            &[],
            Arc::new(BigArchiveReader::new()),
            ParserVocabulary::default(),
        )
        .await
        .unwrap();

        assert_eq!(index.definition_count(), 2);
        assert_eq!(index.asset_count(), 1);
        assert!(index.exists("avtank").await);

        let model = index.find("AVTank").await.unwrap();
        assert_eq!(model.kind, NodeKind::Model);
        assert_eq!(model.bytes, vec![0, 1, 2]);
        assert_eq!(model.location.relative_path(), "Art/W3D/AVTank.W3D");
    }

    #[tokio::test]
    async fn loose_files_override_container_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Data/INI/Weapon.ini", b"Weapon Gun\n  Damage = 2\nEnd\n");
        let big = dir.path().join("INIZH.big");
        std::fs::write(
            &big,
            encode_big(&[
                ("Data\\INI\\Weapon.ini", b"Weapon Gun\n  Damage = 1\nEnd\n"),
                ("Data\\INI\\FX.ini", b"FXList Boom\nEnd\n"),
            ]),
        )
        .unwrap();

        let index = SourceIndex::scan(
            dir.path(),
            &[big.clone()],
            Arc::new(BigArchiveReader::new()),
            ParserVocabulary::default(),
        )
        .await
        .unwrap();

        let gun = index.find("Gun").await.unwrap();
        assert!(String::from_utf8(gun.bytes).unwrap().contains("Damage = 2"));

        let boom = index.find("Boom").await.unwrap();
        assert!(boom.location.is_container_entry());
        let file = index.read_location(&boom.location).await.unwrap();
        assert_eq!(file, b"FXList Boom\nEnd\n");
    }

    #[tokio::test]
    async fn reports_issues_per_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.ini", b"Object Broken\n  BuildCost = 5\n");

        let index = SourceIndex::scan(
            dir.path(),
            &[],
            Arc::new(BigArchiveReader::new()),
            ParserVocabulary::default(),
        )
        .await
        .unwrap();

        assert_eq!(index.issues().len(), 1);
        assert!(index.exists("Broken").await);
    }

    #[tokio::test]
    async fn rejects_missing_root() {
        let err = SourceIndex::scan(
            Path::new("/definitely/not/here"),
            &[],
            Arc::new(BigArchiveReader::new()),
            ParserVocabulary::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRoot(_)));
    }
}
