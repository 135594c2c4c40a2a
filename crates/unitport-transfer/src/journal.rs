//! Durable migration journal
//!
//! One JSON record per migration under `<destination>/<dir>/journal/<id>.json`.
//! Records are rewritten atomically (temp file, then rename) after every
//! recorded operation, so the last persisted state survives a crash.

use crate::error::{JournalError, StateError};
use crate::state::MigrationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Suffix of temporary sibling files
pub const TEMP_SUFFIX: &str = ".unitport-tmp";

/// Default name of the journal directory under the destination
pub const DEFAULT_DIR_NAME: &str = ".unitport";

/// Kind of a recorded file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Existing file replaced by a copy
    FileCopy,

    /// Existing definition file replaced by a merge
    IniModification,

    /// New file created
    FileCreated,
}

/// One applied file operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalOperation {
    pub kind: OperationKind,

    /// Where the content came from
    pub source: String,

    /// Destination path, relative to the destination root
    pub target: PathBuf,

    /// Backup of the replaced file, relative to the destination root
    pub backup: Option<PathBuf>,

    /// Whether a file existed at `target` before
    pub overwritten: bool,

    /// blake3 of the written content
    pub fingerprint: String,

    pub applied_at: DateTime<Utc>,

    /// Set once a rollback has reversed this operation
    #[serde(default)]
    pub undone: bool,
}

/// Journal record of one migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Short migration id
    pub id: String,

    /// Root unit
    pub unit: String,

    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Applied renames, old name to new name
    pub renames: BTreeMap<String, String>,

    /// Operations in execution order
    pub operations: Vec<JournalOperation>,

    pub state: MigrationState,
    pub rolled_back_at: Option<DateTime<Utc>>,

    /// Failure summary when the migration failed
    pub failure: Option<String>,
}

impl JournalEntry {
    /// Start a new record in the `Pending` state
    #[must_use]
    pub fn new(unit: impl Into<String>, source_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            id: short_id(),
            unit: unit.into(),
            source_root: source_root.into(),
            target_root: target_root.into(),
            started_at: Utc::now(),
            duration_ms: 0,
            renames: BTreeMap::new(),
            operations: Vec::new(),
            state: MigrationState::Pending,
            rolled_back_at: None,
            failure: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_renames(mut self, renames: BTreeMap<String, String>) -> Self {
        self.renames = renames;
        self
    }

    /// Move to `to`, validating against the state machine
    ///
    /// # Errors
    /// Returns [`StateError`] for illegal transitions; the entry is unchanged.
    pub fn transition(&mut self, to: MigrationState) -> Result<(), StateError> {
        self.state.validate_transition(to)?;
        tracing::debug!(id = %self.id, from = %self.state, %to, "migration state change");
        self.state = to;
        Ok(())
    }

    /// Append an applied operation
    pub fn record(&mut self, operation: JournalOperation) {
        self.operations.push(operation);
    }

    /// Set `duration_ms` from `started_at`
    pub fn finish_timing(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
    }

    #[inline]
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back_at.is_some() || self.state == MigrationState::RolledBack
    }
}

/// First 8 hex characters of a v4 uuid
#[must_use]
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Journal directory layout under a destination root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalStore {
    destination: PathBuf,
    dir_name: String,
}

impl JournalStore {
    /// Store under `<destination>/<dir_name>`
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, dir_name: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            dir_name: dir_name.into(),
        }
    }

    /// Store with the default directory name
    #[must_use]
    pub fn at(destination: impl Into<PathBuf>) -> Self {
        Self::new(destination, DEFAULT_DIR_NAME)
    }

    #[inline]
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[inline]
    #[must_use]
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Directory holding the records
    #[must_use]
    pub fn journal_dir(&self) -> PathBuf {
        self.destination.join(&self.dir_name).join("journal")
    }

    /// Backup directory of one migration, relative to the destination
    #[must_use]
    pub fn backup_dir(&self, id: &str) -> PathBuf {
        Path::new(&self.dir_name).join("backups").join(id)
    }

    /// Record path of one migration
    #[must_use]
    pub fn entry_path(&self, id: &str) -> PathBuf {
        self.journal_dir().join(format!("{id}.json"))
    }

    /// Persist an entry atomically
    ///
    /// # Errors
    /// IO failures while writing or renaming the record.
    pub async fn save(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let dir = self.journal_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| JournalError::io_error(&dir, e))?;

        let path = self.entry_path(&entry.id);
        let bytes = serde_json::to_vec_pretty(entry).map_err(|source| JournalError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| JournalError::io_error(&path, e))
    }

    /// Load one entry
    ///
    /// # Errors
    /// [`JournalError::NotFound`] for unknown ids, [`JournalError::Corrupt`]
    /// for unreadable records.
    pub async fn load(&self, id: &str) -> Result<JournalEntry, JournalError> {
        let path = self.entry_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JournalError::NotFound(id.to_string()));
            }
            Err(e) => return Err(JournalError::io_error(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| JournalError::Corrupt { path, source })
    }

    /// Every readable entry, newest first
    ///
    /// Unreadable records are skipped with a warning.
    ///
    /// # Errors
    /// Only when the journal directory exists but cannot be listed.
    pub async fn history(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let dir = self.journal_dir();
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::io_error(&dir, e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| JournalError::io_error(&dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id).await {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable journal entry"),
            }
        }

        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}

/// Sibling temp path for `path`
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// Write `bytes` to a temp sibling, then rename over `path`
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_eight_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("/d/Data/INI/Weapon.ini")),
            PathBuf::from("/d/Data/INI/Weapon.ini.unitport-tmp")
        );
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let mut entry = JournalEntry::new("Tank", "/src", "/dst");
        assert!(entry.transition(MigrationState::Succeeded).is_err());
        assert_eq!(entry.state, MigrationState::Pending);
        entry.transition(MigrationState::Analyzing).unwrap();
        assert_eq!(entry.state, MigrationState::Analyzing);
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::at(dir.path());
        let entry = JournalEntry::new("Tank", "/src", dir.path());

        store.save(&entry).await.unwrap();
        let loaded = store.load(&entry.id).await.unwrap();

        assert_eq!(loaded, entry);
        assert!(!temp_path(&store.entry_path(&entry.id)).exists());
    }

    #[tokio::test]
    async fn history_skips_corrupt_records_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::at(dir.path());

        let mut older = JournalEntry::new("Old", "/src", dir.path());
        older.started_at = Utc::now() - chrono::Duration::hours(1);
        let newer = JournalEntry::new("New", "/src", dir.path());
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();
        std::fs::write(store.journal_dir().join("broken.json"), b"{ not json").unwrap();

        let history = store.history().await.unwrap();
        let units: Vec<_> = history.iter().map(|e| e.unit.as_str()).collect();
        assert_eq!(units, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn missing_journal_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JournalStore::at(dir.path()).history().await.unwrap().is_empty());
        let err = JournalStore::at(dir.path()).load("deadbeef").await.unwrap_err();
        assert!(matches!(err, JournalError::NotFound(_)));
    }
}
