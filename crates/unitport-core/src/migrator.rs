//! Migration orchestrator
//!
//! Drives one migration through its lifecycle:
//! `Pending -> Analyzing` (resolve, detect, diagnose) `-> Transferring`
//! (plan, transfer) `-> Succeeded | Failed`. Also fronts history, rollback
//! and recovery for a destination.

use crate::config::UnitportConfig;
use crate::error::MigrationError;
use crate::planner::{AppliedDecision, MigrationPlan, Planner, PlannedMerge};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unitport_block::BlockParser;
use unitport_conflict::{
    ConflictDetector, ConflictKind, ConflictReport, Decisions, Diagnosis, DiagnosisEngine, TargetIndex,
};
use unitport_graph::{
    ArchiveReader, BigArchiveReader, DefinitionIndex, DependencyGraph, DependencyResolver, FileIssue, NodeStatus,
    ProgressEvent, ProgressSink, SourceIndex,
};
use unitport_merge::{MergeEngine, MergeStrategy};
use unitport_transfer::{
    JournalEntry, JournalStore, MigrationState, RecoveryReport, RollbackOutcome, RollbackService, TransferEngine,
    TransferOutcome,
};

/// What to migrate, from where, to where
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub source_root: PathBuf,
    pub unit: String,
    pub target_root: PathBuf,
    pub decisions: Decisions,

    /// Overrides the configured merge strategy
    pub strategy: Option<MergeStrategy>,
}

impl MigrationRequest {
    #[must_use]
    pub fn new(source_root: impl Into<PathBuf>, unit: impl Into<String>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            unit: unit.into(),
            target_root: target_root.into(),
            decisions: Decisions::new(),
            strategy: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_decisions(mut self, decisions: Decisions) -> Self {
        self.decisions = decisions;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Dry-run result: nothing in the destination was touched
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: DependencyGraph,
    pub conflicts: ConflictReport,

    /// Most severe first
    pub diagnoses: Vec<Diagnosis>,

    /// Structural issues in the source files
    pub source_issues: Vec<FileIssue>,
}

impl Analysis {
    /// Diagnoses that need an explicit choice
    pub fn needing_choice(&self) -> impl Iterator<Item = &Diagnosis> {
        self.diagnoses.iter().filter(|d| d.recommended().is_none())
    }
}

/// Graph statistics carried in reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub found: usize,
    pub missing: usize,
    pub max_depth: usize,
    pub completion: f64,
}

impl From<&DependencyGraph> for GraphStats {
    fn from(graph: &DependencyGraph) -> Self {
        Self {
            nodes: graph.len(),
            found: graph.found_count(),
            missing: graph.missing_count(),
            max_depth: graph.max_depth(),
            completion: graph.completion(),
        }
    }
}

/// Result of a successful migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub migration_id: String,
    pub unit: String,
    pub state: MigrationState,
    pub graph: GraphStats,
    pub conflicts: BTreeMap<ConflictKind, usize>,
    pub decisions: Vec<AppliedDecision>,
    pub renames: BTreeMap<String, String>,
    pub skipped_files: Vec<String>,
    pub merges: Vec<PlannedMerge>,
    pub transfer: TransferOutcome,
}

impl MigrationReport {
    /// Multi-line description for humans
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = vec![
            self.transfer.summary(),
            format!(
                "closure: {} nodes, {} found, {} missing, depth {} ({:.1}% complete)",
                self.graph.nodes, self.graph.found, self.graph.missing, self.graph.max_depth, self.graph.completion
            ),
        ];
        if !self.conflicts.is_empty() {
            let counts: Vec<String> = self.conflicts.iter().map(|(k, n)| format!("{n} {k}")).collect();
            lines.push(format!("conflicts: {}", counts.join(", ")));
        }
        for (old, new) in &self.renames {
            lines.push(format!("renamed {old} -> {new}"));
        }
        for path in &self.skipped_files {
            lines.push(format!("skipped {path}"));
        }
        lines.join("\n")
    }
}

/// Orchestrates analysis, planning, transfer and rollback
pub struct Migrator {
    config: UnitportConfig,
    resolver: DependencyResolver,
    detector: ConflictDetector,
    diagnosis: DiagnosisEngine,
    planner: Planner,
    transfer: TransferEngine,
    archives: Arc<dyn ArchiveReader>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(UnitportConfig::default())
    }
}

impl Migrator {
    /// Create a migrator from configuration
    #[must_use]
    pub fn new(config: UnitportConfig) -> Self {
        let parser = BlockParser::new(config.parser.clone());
        let planner = Planner::new(
            parser,
            MergeEngine::new(config.merge.field_policies.clone()),
            config.merge.strategy,
        );
        Self {
            resolver: DependencyResolver::new(config.resolver, config.references.clone(), config.parser.clone()),
            detector: ConflictDetector::new(config.rename.clone()),
            diagnosis: DiagnosisEngine::new(config.severity.clone()),
            planner,
            transfer: TransferEngine::new(),
            archives: Arc::new(BigArchiveReader::new()),
            config,
        }
    }

    /// Use a different container reader
    #[must_use]
    pub fn with_archive_reader(mut self, archives: Arc<dyn ArchiveReader>) -> Self {
        self.archives = archives;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &UnitportConfig {
        &self.config
    }

    /// Journal store for a destination
    #[must_use]
    pub fn journal(&self, target_root: &Path) -> JournalStore {
        JournalStore::new(target_root, self.config.journal.dir_name.clone())
    }

    /// Index a source installation
    ///
    /// # Errors
    /// Returns an error if the root or a container cannot be read.
    pub async fn open_source(&self, source_root: &Path) -> Result<SourceIndex, MigrationError> {
        let containers = self.containers(source_root).await?;
        let index = SourceIndex::scan(source_root, &containers, self.archives.clone(), self.config.parser.clone()).await?;
        for issue in index.issues() {
            tracing::warn!(location = %issue.location, issue = %issue.issue, "source parse issue");
        }
        Ok(index)
    }

    async fn containers(&self, source_root: &Path) -> Result<Vec<PathBuf>, MigrationError> {
        if !self.config.source.containers.is_empty() {
            return Ok(self.config.source.containers.iter().map(|c| source_root.join(c)).collect());
        }

        let mut found = Vec::new();
        let mut dir = match tokio::fs::read_dir(source_root).await {
            Ok(dir) => dir,
            // Reported as an invalid root by the index scan.
            Err(_) => return Ok(found),
        };
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| MigrationError::io_error(source_root, e))?
        {
            let path = entry.path();
            let is_big = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("big"));
            if is_big && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Resolve a unit's closure against an index
    pub async fn resolve(&self, unit: &str, index: &dyn DefinitionIndex, sink: &dyn ProgressSink) -> DependencyGraph {
        self.resolver.resolve(unit, index, sink).await
    }

    /// Dry run against a source directory
    ///
    /// # Errors
    /// Returns an error if either installation cannot be read or the unit is
    /// not defined in the source.
    pub async fn analyze(
        &self,
        source_root: &Path,
        unit: &str,
        target_root: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Analysis, MigrationError> {
        let index = self.open_source(source_root).await?;
        let mut analysis = self.analyze_with(&index, unit, target_root, sink).await?;
        analysis.source_issues = index.issues().to_vec();
        Ok(analysis)
    }

    /// Dry run against any index
    ///
    /// # Errors
    /// See [`Migrator::analyze`].
    #[tracing::instrument(skip(self, index, sink), fields(target = %target_root.display()))]
    pub async fn analyze_with(
        &self,
        index: &dyn DefinitionIndex,
        unit: &str,
        target_root: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Analysis, MigrationError> {
        let graph = self.resolve(unit, index, sink).await;
        if graph.root_node().map_or(true, |n| n.status == NodeStatus::Missing) {
            return Err(MigrationError::UnitNotFound(unit.to_string()));
        }

        sink.emit(ProgressEvent::Stage {
            name: "detect".to_string(),
        });
        let (_, conflicts) = self
            .detector
            .detect_at(&graph, target_root, self.config.parser.clone(), sink)
            .await?;
        let diagnoses = self.diagnosis.diagnose(&conflicts);

        tracing::info!(
            unit,
            nodes = graph.len(),
            completion = graph.completion(),
            conflicts = conflicts.len(),
            "analysis complete"
        );
        Ok(Analysis {
            graph,
            conflicts,
            diagnoses,
            source_issues: Vec::new(),
        })
    }

    /// Migrate a unit from a source directory
    ///
    /// # Errors
    /// Analysis and planning errors leave the destination untouched. A
    /// transfer error has already undone its own writes.
    pub async fn migrate(
        &self,
        request: &MigrationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<MigrationReport, MigrationError> {
        let index = self.open_source(&request.source_root).await?;
        self.migrate_with(&index, request, sink).await
    }

    /// Migrate a unit from any index
    ///
    /// # Errors
    /// See [`Migrator::migrate`].
    #[tracing::instrument(skip(self, index, request, sink), fields(unit = %request.unit))]
    pub async fn migrate_with(
        &self,
        index: &dyn DefinitionIndex,
        request: &MigrationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<MigrationReport, MigrationError> {
        let mut entry = JournalEntry::new(&request.unit, &request.source_root, &request.target_root);
        entry.transition(MigrationState::Analyzing)?;

        let prepared = self.prepare(index, request, sink).await;
        let (analysis, plan) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                entry.transition(MigrationState::Failed)?;
                tracing::error!(id = %entry.id, error = %e, "analysis failed, destination untouched");
                return Err(e);
            }
        };

        entry.renames = plan.renames.clone();
        let store = self.journal(&request.target_root);
        let transfer = self.transfer.transfer(&plan.transfer, &store, &mut entry, sink).await?;

        Ok(MigrationReport {
            migration_id: entry.id,
            unit: request.unit.clone(),
            state: entry.state,
            graph: GraphStats::from(&analysis.graph),
            conflicts: analysis.conflicts.counts(),
            decisions: plan.decisions,
            renames: plan.renames,
            skipped_files: plan.skipped_files,
            merges: plan.merges,
            transfer,
        })
    }

    async fn prepare(
        &self,
        index: &dyn DefinitionIndex,
        request: &MigrationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(Analysis, MigrationPlan), MigrationError> {
        let analysis = self
            .analyze_with(index, &request.unit, &request.target_root, sink)
            .await?;

        let planner = match request.strategy {
            Some(strategy) if strategy != self.planner.strategy() => Planner::new(
                BlockParser::new(self.config.parser.clone()),
                MergeEngine::new(self.config.merge.field_policies.clone()),
                strategy,
            ),
            _ => self.planner.clone(),
        };

        sink.emit(ProgressEvent::Stage {
            name: "plan".to_string(),
        });
        let plan = planner
            .plan(
                &analysis.graph,
                &analysis.diagnoses,
                &request.decisions,
                index,
                &request.target_root,
            )
            .await?;
        Ok((analysis, plan))
    }

    /// Past migrations into a destination, newest first
    ///
    /// # Errors
    /// Only when the journal directory cannot be listed.
    pub async fn history(&self, target_root: &Path) -> Result<Vec<JournalEntry>, MigrationError> {
        Ok(self.journal(target_root).history().await?)
    }

    /// Roll back a past migration
    ///
    /// # Errors
    /// See [`RollbackService::rollback`].
    pub async fn rollback(
        &self,
        target_root: &Path,
        id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RollbackOutcome, MigrationError> {
        Ok(RollbackService::new(self.journal(target_root)).rollback(id, sink).await?)
    }

    /// Clean up after an interrupted migration
    ///
    /// # Errors
    /// See [`RollbackService::recover`].
    pub async fn recover(&self, target_root: &Path, sink: &dyn ProgressSink) -> Result<RecoveryReport, MigrationError> {
        Ok(RollbackService::new(self.journal(target_root)).recover(sink).await?)
    }
}
