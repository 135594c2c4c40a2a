//! Transfer engine
//!
//! Writes a [`TransferPlan`] into the destination one whole file at a time.
//! Every write goes to a temp sibling first and is renamed into place; a
//! replaced file is copied into the migration's backup directory before the
//! rename. The journal is persisted after every operation. When any file fails,
//! every operation applied so far is undone before the error is returned.

use crate::error::TransferError;
use crate::journal::{write_atomic, JournalEntry, JournalOperation, JournalStore, OperationKind};
use crate::rollback::undo_entry;
use crate::state::MigrationState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use unitport_graph::{ProgressEvent, ProgressSink};

/// Where an item's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferContent {
    /// Content prepared in memory (rewritten or merged text)
    Bytes(Vec<u8>),

    /// Content read from a file at transfer time
    File(PathBuf),
}

/// How an item lands on an existing destination file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Replace the file
    #[default]
    Copy,

    /// Content is a merge of the existing file with the incoming one
    Merge,
}

/// One file of a transfer plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    /// Destination path relative to the destination root, `/` separated
    pub relative_path: String,

    /// Shallowest graph depth of the definitions in this file
    pub depth: usize,

    /// Human-readable origin, recorded in the journal
    pub source: String,

    pub content: TransferContent,
    pub mode: TransferMode,
}

impl TransferItem {
    /// Item copied from a file on disk
    #[must_use]
    pub fn from_file(relative_path: impl Into<String>, depth: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            relative_path: relative_path.into(),
            depth,
            source: path.display().to_string(),
            content: TransferContent::File(path),
            mode: TransferMode::Copy,
        }
    }

    /// Item with prepared content
    #[must_use]
    pub fn from_bytes(
        relative_path: impl Into<String>,
        depth: usize,
        source: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            depth,
            source: source.into(),
            content: TransferContent::Bytes(bytes),
            mode: TransferMode::Copy,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Ordered set of files to write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    items: Vec<TransferItem>,
}

impl TransferPlan {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item; a later item for the same path replaces the earlier one
    pub fn push(&mut self, item: TransferItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.relative_path.eq_ignore_ascii_case(&item.relative_path))
        {
            *existing = item;
        } else {
            self.items.push(item);
        }
    }

    #[inline]
    #[must_use]
    pub fn with_item(mut self, item: TransferItem) -> Self {
        self.push(item);
        self
    }

    /// Items in execution order, shallow first then by path
    #[must_use]
    pub fn ordered(&self) -> Vec<&TransferItem> {
        let mut items: Vec<&TransferItem> = self.items.iter().collect();
        items.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.relative_path.cmp(&b.relative_path)));
        items
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Relative paths in execution order
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.ordered().into_iter().map(|i| i.relative_path.as_str()).collect()
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub migration_id: String,
    pub unit: String,
    pub created: usize,
    pub replaced: usize,
    pub merged: usize,
    pub bytes_written: u64,
    pub duration_ms: u64,
}

impl TransferOutcome {
    #[inline]
    #[must_use]
    pub fn files(&self) -> usize {
        self.created + self.replaced + self.merged
    }

    /// One-line description for humans
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "migrated {}: {} files ({} created, {} replaced, {} merged) in {} ms [journal {}]",
            self.unit,
            self.files(),
            self.created,
            self.replaced,
            self.merged,
            self.duration_ms,
            self.migration_id
        )
    }
}

/// Executes transfer plans
#[derive(Debug, Clone)]
pub struct TransferEngine {
    verify_writes: bool,

    #[cfg(test)]
    tamper_after_write: bool,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self {
            verify_writes: true,
            #[cfg(test)]
            tamper_after_write: false,
        }
    }
}

impl TransferEngine {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read every written file and compare fingerprints
    #[inline]
    #[must_use]
    pub fn with_verify_writes(mut self, verify: bool) -> Self {
        self.verify_writes = verify;
        self
    }

    /// Write `plan` into the store's destination, recording into `entry`
    ///
    /// `entry` must be in the `Analyzing` state. On success it ends in
    /// `Succeeded`; on failure every applied operation has been undone and the
    /// entry ends in `Failed`. Either way it is persisted.
    ///
    /// # Errors
    /// [`TransferError::Failed`] when a file could not be written,
    /// [`TransferError::State`] for an entry in the wrong state, and
    /// [`TransferError::Journal`] when the journal cannot be written before
    /// any file is touched.
    #[tracing::instrument(skip_all, fields(id = %entry.id, unit = %entry.unit, files = plan.len()))]
    pub async fn transfer(
        &self,
        plan: &TransferPlan,
        store: &JournalStore,
        entry: &mut JournalEntry,
        sink: &dyn ProgressSink,
    ) -> Result<TransferOutcome, TransferError> {
        entry.transition(MigrationState::Transferring)?;
        store.save(entry).await?;
        sink.emit(ProgressEvent::Stage {
            name: "transfer".to_string(),
        });

        let items = plan.ordered();
        let total = items.len();
        let mut bytes_written = 0u64;

        for (index, item) in items.into_iter().enumerate() {
            let applied = self.apply(item, store, &entry.id).await;
            let failure = match applied {
                Ok((operation, written)) => {
                    entry.record(operation);
                    bytes_written += written;
                    match store.save(entry).await {
                        Ok(()) => None,
                        Err(e) => Some(format!("journal write failed: {e}")),
                    }
                }
                Err(reason) => Some(reason),
            };

            if let Some(reason) = failure {
                return Err(self.fail(store, entry, &item.relative_path, reason, sink).await);
            }

            tracing::debug!(path = %item.relative_path, index, total, "file transferred");
            sink.emit(ProgressEvent::FileTransferred {
                relative_path: item.relative_path.clone(),
                index: index + 1,
                total,
            });
        }

        entry.transition(MigrationState::Succeeded)?;
        entry.finish_timing();
        store.save(entry).await?;

        let count = |kind: OperationKind| entry.operations.iter().filter(|o| o.kind == kind).count();
        let outcome = TransferOutcome {
            migration_id: entry.id.clone(),
            unit: entry.unit.clone(),
            created: count(OperationKind::FileCreated),
            replaced: count(OperationKind::FileCopy),
            merged: count(OperationKind::IniModification),
            bytes_written,
            duration_ms: entry.duration_ms,
        };
        tracing::info!(summary = %outcome.summary(), "transfer complete");
        Ok(outcome)
    }

    async fn fail(
        &self,
        store: &JournalStore,
        entry: &mut JournalEntry,
        relative_path: &str,
        reason: String,
        sink: &dyn ProgressSink,
    ) -> TransferError {
        tracing::error!(path = %relative_path, %reason, "transfer failed, undoing applied operations");
        sink.emit(ProgressEvent::TransferFailed {
            relative_path: relative_path.to_string(),
            reason: reason.clone(),
        });

        let (undone, undo_errors) = undo_entry(store, entry).await;
        sink.emit(ProgressEvent::RolledBack { operations: undone });

        entry.failure = Some(format!("{relative_path}: {reason}"));
        entry.finish_timing();
        if let Err(e) = entry.transition(MigrationState::Failed) {
            tracing::warn!(error = %e, "could not mark migration failed");
        }
        if let Err(e) = store.save(entry).await {
            tracing::warn!(error = %e, "could not persist failed migration");
        }

        TransferError::Failed {
            unit: entry.unit.clone(),
            relative_path: relative_path.to_string(),
            reason,
            undone,
            undo_errors,
        }
    }

    /// Apply one item; returns the recorded operation and bytes written
    async fn apply(
        &self,
        item: &TransferItem,
        store: &JournalStore,
        id: &str,
    ) -> Result<(JournalOperation, u64), String> {
        let relative = checked_relative(&item.relative_path)?;
        let bytes = match &item.content {
            TransferContent::Bytes(bytes) => bytes.clone(),
            TransferContent::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?,
        };

        let destination = store.destination().join(&relative);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
        }

        let existed = tokio::fs::try_exists(&destination)
            .await
            .map_err(|e| format!("cannot stat {}: {e}", destination.display()))?;

        let backup = if existed {
            let backup = store.backup_dir(id).join(&relative);
            let backup_abs = store.destination().join(&backup);
            if let Some(parent) = backup_abs.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("cannot create backup dir {}: {e}", parent.display()))?;
            }
            tokio::fs::copy(&destination, &backup_abs)
                .await
                .map_err(|e| format!("cannot back up {}: {e}", destination.display()))?;
            Some((backup, backup_abs))
        } else {
            None
        };

        let fingerprint = blake3::hash(&bytes).to_hex().to_string();
        if let Err(reason) = self.write(&destination, &bytes, &fingerprint).await {
            let backup_abs = backup.as_ref().map(|(_, abs)| abs.as_path());
            return Err(discard_write(&destination, backup_abs, reason).await);
        }

        let kind = match (existed, item.mode) {
            (false, _) => OperationKind::FileCreated,
            (true, TransferMode::Copy) => OperationKind::FileCopy,
            (true, TransferMode::Merge) => OperationKind::IniModification,
        };

        let operation = JournalOperation {
            kind,
            source: item.source.clone(),
            target: relative,
            backup: backup.map(|(relative, _)| relative),
            overwritten: existed,
            fingerprint,
            applied_at: Utc::now(),
            undone: false,
        };
        Ok((operation, bytes.len() as u64))
    }

    async fn write(&self, destination: &Path, bytes: &[u8], fingerprint: &str) -> Result<(), String> {
        write_atomic(destination, bytes)
            .await
            .map_err(|e| format!("cannot write {}: {e}", destination.display()))?;

        #[cfg(test)]
        if self.tamper_after_write {
            tokio::fs::write(destination, b"tampered")
                .await
                .map_err(|e| format!("cannot tamper {}: {e}", destination.display()))?;
        }

        if self.verify_writes {
            let written = tokio::fs::read(destination)
                .await
                .map_err(|e| format!("cannot verify {}: {e}", destination.display()))?;
            if blake3::hash(&written).to_hex().as_str() != fingerprint {
                return Err(format!("fingerprint mismatch after writing {}", destination.display()));
            }
        }
        Ok(())
    }
}

/// Put the destination back the way it was after a failed write
///
/// With a backup the original content is written back over the destination
/// and the backup removed; without one the file did not exist and is deleted.
/// The backup is kept whenever the restore itself fails.
async fn discard_write(destination: &Path, backup: Option<&Path>, reason: String) -> String {
    let restored = match backup {
        Some(backup) => match tokio::fs::read(backup).await {
            Ok(original) => write_atomic(destination, &original)
                .await
                .map_err(|e| format!("cannot restore {}: {e}", destination.display())),
            Err(e) => Err(format!("cannot read backup {}: {e}", backup.display())),
        },
        None => match tokio::fs::remove_file(destination).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("cannot remove {}: {e}", destination.display())),
        },
    };

    match restored {
        Ok(()) => {
            if let Some(backup) = backup {
                if let Err(e) = tokio::fs::remove_file(backup).await {
                    tracing::warn!(backup = %backup.display(), error = %e, "could not remove backup");
                }
            }
            reason
        }
        Err(restore) => {
            tracing::error!(path = %destination.display(), %restore, "destination left in written state");
            format!("{reason}; {restore}")
        }
    }
}

/// Reject absolute paths and parent components
fn checked_relative(relative: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(relative.replace('\\', "/"));
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(format!("refusing to write outside the destination: {relative}"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_orders_shallow_first_then_by_path() {
        let plan = TransferPlan::new()
            .with_item(TransferItem::from_bytes("Data/INI/FX.ini", 3, "mem", Vec::new()))
            .with_item(TransferItem::from_bytes("Data/INI/Object/Tank.ini", 0, "mem", Vec::new()))
            .with_item(TransferItem::from_bytes("Data/INI/Armor.ini", 1, "mem", Vec::new()))
            .with_item(TransferItem::from_bytes("Data/INI/Weapon.ini", 1, "mem", Vec::new()));

        assert_eq!(
            plan.paths(),
            vec![
                "Data/INI/Object/Tank.ini",
                "Data/INI/Armor.ini",
                "Data/INI/Weapon.ini",
                "Data/INI/FX.ini"
            ]
        );
    }

    #[test]
    fn later_item_replaces_same_path() {
        let mut plan = TransferPlan::new();
        plan.push(TransferItem::from_bytes("Data/INI/Weapon.ini", 1, "a", b"a".to_vec()));
        plan.push(TransferItem::from_bytes("data/ini/weapon.ini", 1, "b", b"b".to_vec()));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.ordered()[0].source, "b");
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert!(checked_relative("../outside.ini").is_err());
        assert!(checked_relative("/etc/passwd").is_err());
        assert!(checked_relative("").is_err());
        assert_eq!(
            checked_relative("Data\\INI\\Weapon.ini").unwrap(),
            PathBuf::from("Data/INI/Weapon.ini")
        );
    }

    fn tampering() -> TransferEngine {
        TransferEngine {
            tamper_after_write: true,
            ..TransferEngine::default()
        }
    }

    #[tokio::test]
    async fn verify_failure_restores_the_replaced_file() {
        let dest = tempfile::tempdir().unwrap();
        let weapon = dest.path().join("Data/INI/Weapon.ini");
        std::fs::create_dir_all(weapon.parent().unwrap()).unwrap();
        std::fs::write(&weapon, "Weapon Old\nEnd\n").unwrap();

        let store = JournalStore::at(dest.path());
        let item = TransferItem::from_bytes("Data/INI/Weapon.ini", 1, "source", b"Weapon New\nEnd\n".to_vec());
        let reason = tampering().apply(&item, &store, "ab12cd34").await.unwrap_err();

        assert!(reason.contains("fingerprint mismatch"), "{reason}");
        assert_eq!(std::fs::read_to_string(&weapon).unwrap(), "Weapon Old\nEnd\n");
        let backup = dest.path().join(store.backup_dir("ab12cd34")).join("Data/INI/Weapon.ini");
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn verify_failure_removes_a_created_file() {
        let dest = tempfile::tempdir().unwrap();
        let store = JournalStore::at(dest.path());
        let item = TransferItem::from_bytes("Data/INI/FX.ini", 2, "source", b"FXList Boom\nEnd\n".to_vec());

        assert!(tampering().apply(&item, &store, "ab12cd34").await.is_err());
        assert!(!dest.path().join("Data/INI/FX.ini").exists());
    }

    #[tokio::test]
    async fn failed_verification_fails_the_migration_with_files_intact() {
        use unitport_graph::NoopSink;

        let dest = tempfile::tempdir().unwrap();
        let armor = dest.path().join("Data/INI/Armor.ini");
        std::fs::create_dir_all(armor.parent().unwrap()).unwrap();
        std::fs::write(&armor, "Armor Old\nEnd\n").unwrap();

        let plan = TransferPlan::new()
            .with_item(TransferItem::from_bytes("Data/INI/Armor.ini", 1, "source", b"Armor New\nEnd\n".to_vec()));
        let store = JournalStore::at(dest.path());
        let mut entry = JournalEntry::new("Tank", "/source", dest.path());
        entry.transition(MigrationState::Analyzing).unwrap();

        let err = tampering().transfer(&plan, &store, &mut entry, &NoopSink).await.unwrap_err();
        assert!(matches!(err, TransferError::Failed { .. }));
        assert_eq!(entry.state, MigrationState::Failed);
        assert_eq!(std::fs::read_to_string(&armor).unwrap(), "Armor Old\nEnd\n");
    }

    #[test]
    fn summary_reads_naturally() {
        let outcome = TransferOutcome {
            migration_id: "ab12cd34".to_string(),
            unit: "Tank".to_string(),
            created: 3,
            replaced: 1,
            merged: 1,
            bytes_written: 100,
            duration_ms: 12,
        };
        assert_eq!(
            outcome.summary(),
            "migrated Tank: 5 files (3 created, 1 replaced, 1 merged) in 12 ms [journal ab12cd34]"
        );
    }
}
