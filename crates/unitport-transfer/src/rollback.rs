//! Rollback and crash recovery

use crate::error::{JournalError, RollbackError};
use crate::journal::{write_atomic, JournalEntry, JournalOperation, JournalStore, TEMP_SUFFIX};
use crate::state::MigrationState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unitport_graph::{ProgressEvent, ProgressSink};

/// Undo the entry's pending operations in reverse order
///
/// Restores backups over their targets, deletes created files, then removes
/// directories left empty. Each undone operation is marked and the entry saved
/// straight away, so a later pass only touches what is still pending. Returns
/// how many operations this pass undid and the failures it skipped over.
pub(crate) async fn undo_entry(store: &JournalStore, entry: &mut JournalEntry) -> (usize, Vec<String>) {
    let mut undone = 0;
    let mut errors = Vec::new();

    for index in (0..entry.operations.len()).rev() {
        let operation = &entry.operations[index];
        if operation.undone {
            continue;
        }
        match undo_one(store.destination(), operation).await {
            Ok(()) => {
                undone += 1;
                entry.operations[index].undone = true;
                if let Err(e) = store.save(entry).await {
                    tracing::warn!(id = %entry.id, error = %e, "could not persist undo progress");
                }
            }
            Err(e) => {
                tracing::warn!(target = %operation.target.display(), error = %e, "undo failed");
                errors.push(e);
            }
        }
    }

    (undone, errors)
}

async fn undo_one(destination: &Path, operation: &JournalOperation) -> Result<(), String> {
    let target = destination.join(&operation.target);

    match &operation.backup {
        Some(backup) => {
            let backup_abs = destination.join(backup);
            let bytes = tokio::fs::read(&backup_abs)
                .await
                .map_err(|e| format!("cannot read backup {}: {e}", backup_abs.display()))?;
            write_atomic(&target, &bytes)
                .await
                .map_err(|e| format!("cannot restore {}: {e}", target.display()))?;
            remove_file_if_present(&backup_abs)
                .await
                .map_err(|e| format!("cannot remove backup {}: {e}", backup_abs.display()))?;
            remove_empty_dirs(&backup_abs, destination).await;
        }
        None if operation.overwritten => {
            return Err(format!("no backup recorded for overwritten {}", target.display()));
        }
        None => {
            remove_file_if_present(&target)
                .await
                .map_err(|e| format!("cannot delete {}: {e}", target.display()))?;
            remove_empty_dirs(&target, destination).await;
        }
    }
    Ok(())
}

async fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove empty ancestors of `path`, stopping at `root`
async fn remove_empty_dirs(path: &Path, root: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Result of a rollback request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub migration_id: String,
    pub unit: String,
    pub operations: usize,

    /// Files changed after the migration wrote them
    pub modified_since: Vec<PathBuf>,
}

/// Result of crash recovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Temp artifacts deleted
    pub temp_files_removed: Vec<PathBuf>,

    /// Interrupted migrations rolled back
    pub recovered: Vec<String>,

    /// Failures, per file or entry
    pub errors: Vec<String>,
}

impl RecoveryReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reverses past migrations recorded in a journal store
#[derive(Debug, Clone)]
pub struct RollbackService {
    store: JournalStore,
}

impl RollbackService {
    #[must_use]
    pub fn new(store: JournalStore) -> Self {
        Self { store }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    /// Roll back a succeeded migration
    ///
    /// A second request for the same migration is rejected without touching
    /// any file.
    ///
    /// # Errors
    /// [`RollbackError::AlreadyRolledBack`] and [`RollbackError::NotRollbackable`]
    /// for rejected requests, [`RollbackError::Incomplete`] when some operation
    /// could not be undone. The entry then stays `Succeeded` with the undone
    /// operations marked, and a retry resumes with the rest.
    #[tracing::instrument(skip(self, sink))]
    pub async fn rollback(&self, id: &str, sink: &dyn ProgressSink) -> Result<RollbackOutcome, RollbackError> {
        let mut entry = self.store.load(id).await?;
        if entry.is_rolled_back() {
            tracing::info!(id, "already rolled back, nothing to do");
            return Err(RollbackError::AlreadyRolledBack(id.to_string()));
        }
        if entry.state != MigrationState::Succeeded {
            return Err(RollbackError::NotRollbackable {
                id: id.to_string(),
                state: entry.state,
            });
        }

        let modified_since = self.modified_since(&entry).await;
        for path in &modified_since {
            tracing::warn!(path = %path.display(), "file changed since migration, restoring anyway");
        }

        let (_, errors) = undo_entry(&self.store, &mut entry).await;
        if !errors.is_empty() {
            return Err(RollbackError::Incomplete {
                id: id.to_string(),
                errors,
            });
        }

        let undone = entry.operations.len();
        entry.transition(MigrationState::RolledBack)?;
        entry.rolled_back_at = Some(Utc::now());
        self.store.save(&entry).await?;
        sink.emit(ProgressEvent::RolledBack { operations: undone });
        tracing::info!(id, unit = %entry.unit, operations = undone, "migration rolled back");

        Ok(RollbackOutcome {
            migration_id: entry.id,
            unit: entry.unit,
            operations: undone,
            modified_since,
        })
    }

    /// Targets whose current content differs from what the migration wrote
    async fn modified_since(&self, entry: &JournalEntry) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for operation in entry.operations.iter().filter(|o| !o.undone) {
            let path = self.store.destination().join(&operation.target);
            let same = match tokio::fs::read(&path).await {
                Ok(bytes) => blake3::hash(&bytes).to_hex().as_str() == operation.fingerprint,
                Err(_) => false,
            };
            if !same {
                changed.push(operation.target.clone());
            }
        }
        changed
    }

    /// Clean up after an interrupted run
    ///
    /// Deletes temp artifacts under the destination and rolls back every
    /// migration still recorded as `Transferring`, marking it `Failed`.
    ///
    /// # Errors
    /// Only when the journal directory cannot be listed.
    #[tracing::instrument(skip(self, sink), fields(destination = %self.store.destination().display()))]
    pub async fn recover(&self, sink: &dyn ProgressSink) -> Result<RecoveryReport, RollbackError> {
        let mut report = RecoveryReport {
            temp_files_removed: self.remove_temp_files().await?,
            ..RecoveryReport::default()
        };

        for mut entry in self.store.history().await? {
            if entry.state != MigrationState::Transferring {
                continue;
            }
            tracing::warn!(id = %entry.id, unit = %entry.unit, "rolling back interrupted migration");
            let (undone, errors) = undo_entry(&self.store, &mut entry).await;
            sink.emit(ProgressEvent::RolledBack { operations: undone });

            entry.transition(MigrationState::Failed)?;
            entry.failure = Some("interrupted; rolled back by recovery".to_string());
            self.store.save(&entry).await?;

            report.errors.extend(errors.into_iter().map(|e| format!("{}: {e}", entry.id)));
            report.recovered.push(entry.id);
        }

        tracing::info!(
            temp_files = report.temp_files_removed.len(),
            recovered = report.recovered.len(),
            "recovery finished"
        );
        Ok(report)
    }

    async fn remove_temp_files(&self) -> Result<Vec<PathBuf>, RollbackError> {
        let root = self.store.destination().to_path_buf();
        let walk_root = root.clone();
        let found = tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&walk_root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.file_name().to_string_lossy().ends_with(TEMP_SUFFIX))
                .map(walkdir::DirEntry::into_path)
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| JournalError::io_error(&root, std::io::Error::other(e)))?;

        let mut removed = Vec::new();
        for path in found {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed temp artifact");
                    removed.push(path.strip_prefix(&root).map_or_else(|_| path.clone(), Path::to_path_buf));
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove temp artifact"),
            }
        }
        Ok(removed)
    }
}
