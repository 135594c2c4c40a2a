//! Migration planning
//!
//! Turns a resolved graph plus conflict decisions into a [`TransferPlan`].
//! Text definition files carry only the closure's blocks, minus skipped
//! definitions, with renames applied. Files chosen for merging are merged
//! against the target's copy here, so the transfer only writes bytes.

use crate::error::MigrationError;
use crate::rewrite::{apply_renames, retain_blocks};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use unitport_block::BlockParser;
use unitport_conflict::{ConflictKind, Decisions, Diagnosis, ResolutionAction};
use unitport_graph::{ClosureFile, DefinitionIndex, DependencyGraph};
use unitport_merge::{FieldStatus, MergeEngine, MergeStrategy};
use unitport_transfer::{TransferItem, TransferMode, TransferPlan};

/// Action applied to one conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDecision {
    /// Conflict key
    pub key: String,

    /// Chosen action
    pub action: ResolutionAction,

    /// Whether the caller chose it explicitly
    pub explicit: bool,
}

/// Merge performed while planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMerge {
    pub relative_path: String,
    pub merged_blocks: usize,
    pub appended_blocks: usize,
    pub modified_fields: usize,
}

/// Everything the transfer needs, plus what the planner decided
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub transfer: TransferPlan,

    /// Old name to new name
    pub renames: BTreeMap<String, String>,

    pub decisions: Vec<AppliedDecision>,
    pub skipped_definitions: BTreeSet<String>,
    pub skipped_files: Vec<String>,
    pub merges: Vec<PlannedMerge>,
}

/// Builds migration plans
#[derive(Debug, Clone, Default)]
pub struct Planner {
    parser: BlockParser,
    merge: MergeEngine,
    strategy: MergeStrategy,
}

/// Per-file action derived from decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Copy,
    Merge,
    Skip,
}

impl Planner {
    #[must_use]
    pub fn new(parser: BlockParser, merge: MergeEngine, strategy: MergeStrategy) -> Self {
        Self {
            parser,
            merge,
            strategy,
        }
    }

    /// Merge strategy used for files chosen for merging
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Build the plan
    ///
    /// # Errors
    /// Invalid decisions, unreadable source or target files, and failed merges.
    #[tracing::instrument(skip_all, fields(root = %graph.root()))]
    pub async fn plan(
        &self,
        graph: &DependencyGraph,
        diagnoses: &[Diagnosis],
        decisions: &Decisions,
        index: &dyn DefinitionIndex,
        target_root: &Path,
    ) -> Result<MigrationPlan, MigrationError> {
        let mut plan = MigrationPlan::default();
        let mut file_actions: HashMap<String, FileAction> = HashMap::new();
        let mut existing_paths: HashMap<String, String> = HashMap::new();

        for diagnosis in diagnoses {
            let action = decisions.resolve(diagnosis)?;
            let conflict = &diagnosis.conflict;
            if conflict.conflict == ConflictKind::FileOverwrite {
                if let Some(existing) = &conflict.existing_path {
                    existing_paths.insert(conflict.name.to_ascii_lowercase(), existing.clone());
                }
            }
            match (conflict.conflict, &action) {
                (ConflictKind::FileOverwrite, ResolutionAction::Skip) => {
                    file_actions.insert(conflict.name.to_ascii_lowercase(), FileAction::Skip);
                }
                (ConflictKind::FileOverwrite, ResolutionAction::Merge) => {
                    file_actions.insert(conflict.name.to_ascii_lowercase(), FileAction::Merge);
                }
                (_, ResolutionAction::Rename { new_name }) => {
                    plan.renames.insert(conflict.name.clone(), new_name.clone());
                }
                (ConflictKind::Duplicate | ConflictKind::NameCollision, ResolutionAction::Skip) => {
                    plan.skipped_definitions.insert(conflict.name.clone());
                }
                _ => {}
            }
            tracing::debug!(key = %conflict.key(), %action, "decision applied");
            plan.decisions.push(AppliedDecision {
                key: conflict.key(),
                explicit: decisions.choice(&conflict.key()).is_some(),
                action,
            });
        }

        for file in graph.files() {
            let relative = file.location.relative_path();
            let key = relative.to_ascii_lowercase();
            let action = file_actions.get(&key).copied().unwrap_or(FileAction::Copy);
            // Replaced files keep the target's spelling of their path.
            let destination = existing_paths.get(&key).cloned().unwrap_or_else(|| relative.clone());

            if action == FileAction::Skip {
                tracing::info!(path = %relative, "file skipped by decision");
                plan.skipped_files.push(relative);
                continue;
            }

            let bytes = index.read_location(&file.location).await?;
            let item = if is_text_definition_file(&relative) {
                match self.text_item(&file, &destination, bytes, action, &plan, target_root).await? {
                    Some((item, merge)) => {
                        plan.merges.extend(merge);
                        item
                    }
                    None => {
                        tracing::info!(path = %relative, "no definitions left to transfer");
                        plan.skipped_files.push(relative);
                        continue;
                    }
                }
            } else {
                TransferItem::from_bytes(destination, file.depth, file.location.to_string(), bytes)
            };
            plan.transfer.push(item);
        }

        tracing::info!(
            files = plan.transfer.len(),
            renames = plan.renames.len(),
            skipped_files = plan.skipped_files.len(),
            merges = plan.merges.len(),
            "migration planned"
        );
        Ok(plan)
    }

    /// Transfer item for a definition file written to `relative` in the target
    async fn text_item(
        &self,
        file: &ClosureFile,
        relative: &str,
        bytes: Vec<u8>,
        action: FileAction,
        plan: &MigrationPlan,
        target_root: &Path,
    ) -> Result<Option<(TransferItem, Option<PlannedMerge>)>, MigrationError> {
        let text = decode(relative, bytes);
        let outcome = self.parser.parse(&text);

        let wanted: HashSet<&str> = file
            .definitions
            .iter()
            .map(String::as_str)
            .filter(|name| !plan.skipped_definitions.contains(*name))
            .collect();
        if !outcome.blocks.iter().any(|b| wanted.contains(b.name.as_str())) {
            return Ok(None);
        }

        let kept = retain_blocks(&text, &outcome.blocks, |b| wanted.contains(b.name.as_str()));
        let (incoming, replaced) = apply_renames(&kept, &plan.renames);
        if replaced > 0 {
            tracing::debug!(path = %relative, replaced, "renames applied");
        }

        let source = file.location.to_string();
        if action != FileAction::Merge {
            return Ok(Some((
                TransferItem::from_bytes(relative, file.depth, source, incoming.into_bytes()),
                None,
            )));
        }

        let target_path = target_root.join(relative);
        let existing = tokio::fs::read(&target_path)
            .await
            .map_err(|e| MigrationError::io_error(&target_path, e))?;
        let existing = decode(relative, existing);

        let merged = self
            .merge
            .merge_files(&self.parser, &existing, &incoming, self.strategy)
            .map_err(|source| MigrationError::Merge {
                path: relative.to_string(),
                source,
            })?;
        let summary = PlannedMerge {
            relative_path: relative.to_string(),
            merged_blocks: merged.merged.len(),
            appended_blocks: merged.appended.len(),
            modified_fields: merged.merged.iter().map(|r| r.count(FieldStatus::Modified)).sum(),
        };

        let item = TransferItem::from_bytes(relative, file.depth, source, merged.text.into_bytes())
            .with_mode(TransferMode::Merge);
        Ok(Some((item, Some(summary))))
    }
}

fn is_text_definition_file(relative: &str) -> bool {
    relative.to_ascii_lowercase().ends_with(".ini")
}

fn decode(relative: &str, bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %relative, "file is not UTF-8, invalid bytes replaced");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}
