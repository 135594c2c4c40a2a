//! Diagnosis: severity and ranked resolutions per conflict

use crate::conflict::{ConflictEntry, ConflictKind, ConflictReport};
use crate::error::ConflictError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use unitport_graph::NodeKind;

/// How much a conflict matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

static DEFAULT_SEVERITIES: Lazy<BTreeMap<NodeKind, Severity>> = Lazy::new(|| {
    use NodeKind as K;
    use Severity as S;
    [
        (K::Object, S::Critical),
        (K::Weapon, S::High),
        (K::Armor, S::High),
        (K::CommandSet, S::High),
        (K::CommandButton, S::High),
        (K::Upgrade, S::High),
        (K::SpecialPower, S::High),
        (K::Locomotor, S::Medium),
        (K::Science, S::Medium),
        (K::ObjectCreationList, S::Medium),
        (K::FxList, S::Low),
        (K::ParticleSystem, S::Low),
        (K::Audio, S::Low),
        (K::Model, S::Low),
        (K::Texture, S::Low),
    ]
    .into_iter()
    .collect()
});

/// Kind to severity table with configurable overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityTable {
    /// Overrides keyed by kind name (`"Object"`, `"FXList"`, ...)
    pub overrides: BTreeMap<String, Severity>,

    /// Severity for kinds in neither table
    pub fallback: Severity,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            fallback: Severity::Medium,
        }
    }
}

impl SeverityTable {
    #[inline]
    #[must_use]
    pub fn with_override(mut self, kind: NodeKind, severity: Severity) -> Self {
        self.overrides.insert(kind.as_str().to_string(), severity);
        self
    }

    /// Base severity of a kind
    #[must_use]
    pub fn for_kind(&self, kind: NodeKind) -> Severity {
        self.overrides
            .get(kind.as_str())
            .or_else(|| DEFAULT_SEVERITIES.get(&kind))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Severity of a conflict, with the per-kind floors applied
    #[must_use]
    pub fn for_conflict(&self, entry: &ConflictEntry) -> Severity {
        let base = self.for_kind(entry.kind);
        match entry.conflict {
            ConflictKind::FileOverwrite => base.max(Severity::Medium),
            ConflictKind::NameCollision => base.max(Severity::Low),
            ConflictKind::Duplicate => base,
        }
    }
}

/// What to do about a conflict
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Transfer under a new name, rewriting references
    Rename { new_name: String },

    /// Replace what the target has
    Overwrite,

    /// Keep the target's version, do not transfer
    Skip,

    /// Field-level merge of the existing and incoming file
    Merge,
}

impl ResolutionAction {
    /// Variant name, ignoring payload
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Merge => "merge",
        }
    }

    fn same_variant(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Display for ResolutionAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { new_name } => write!(f, "rename to {new_name}"),
            other => f.write_str(other.name()),
        }
    }
}

/// One ranked candidate resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOption {
    /// Action to take
    pub action: ResolutionAction,

    /// 1 is the best candidate
    pub rank: u8,

    /// Whether the option may be applied without an explicit choice
    pub auto_applicable: bool,

    /// Human-readable description
    pub description: String,
}

/// A conflict with its severity and candidate resolutions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub conflict: ConflictEntry,
    pub severity: Severity,
    pub options: Vec<ResolutionOption>,
}

impl Diagnosis {
    /// Highest-ranked auto-applicable option
    #[must_use]
    pub fn recommended(&self) -> Option<&ResolutionOption> {
        self.options.iter().filter(|o| o.auto_applicable).min_by_key(|o| o.rank)
    }

    /// Whether `action` is one of the offered options
    #[must_use]
    pub fn offers(&self, action: &ResolutionAction) -> bool {
        self.options.iter().any(|o| o.action.same_variant(action))
    }
}

/// Assigns severities and candidate resolutions
#[derive(Debug, Clone, Default)]
pub struct DiagnosisEngine {
    table: SeverityTable,
}

impl DiagnosisEngine {
    #[inline]
    #[must_use]
    pub fn new(table: SeverityTable) -> Self {
        Self { table }
    }

    /// Diagnose every conflict, most severe first
    #[must_use]
    pub fn diagnose(&self, report: &ConflictReport) -> Vec<Diagnosis> {
        let mut diagnoses: Vec<Diagnosis> = report.entries.iter().map(|e| self.diagnose_one(e)).collect();
        diagnoses.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.conflict.key().cmp(&b.conflict.key()))
        });
        diagnoses
    }

    /// Diagnose a single conflict
    #[must_use]
    pub fn diagnose_one(&self, entry: &ConflictEntry) -> Diagnosis {
        let severity = self.table.for_conflict(entry);
        let rename = entry.rename.clone().unwrap_or_default();

        let candidates: Vec<(ResolutionAction, bool, String)> = match entry.conflict {
            ConflictKind::Duplicate => vec![
                (
                    ResolutionAction::Rename { new_name: rename.clone() },
                    true,
                    format!("transfer as {rename} and rewrite references"),
                ),
                (
                    ResolutionAction::Overwrite,
                    true,
                    "replace the target's definition of the same type".to_string(),
                ),
                (ResolutionAction::Skip, true, "keep the target's definition".to_string()),
            ],
            ConflictKind::NameCollision => vec![
                (
                    ResolutionAction::Rename { new_name: rename.clone() },
                    true,
                    format!("transfer as {rename}; the target uses the name for a different type"),
                ),
                (ResolutionAction::Skip, true, "do not transfer this definition".to_string()),
            ],
            ConflictKind::FileOverwrite if entry.is_text_file() => vec![
                (
                    ResolutionAction::Merge,
                    true,
                    "merge fields of matching blocks into the existing file".to_string(),
                ),
                (ResolutionAction::Skip, true, "keep the existing file".to_string()),
                (
                    ResolutionAction::Overwrite,
                    false,
                    "replace the existing file (backed up)".to_string(),
                ),
            ],
            ConflictKind::FileOverwrite => vec![
                (ResolutionAction::Skip, true, "keep the existing file".to_string()),
                (
                    ResolutionAction::Overwrite,
                    false,
                    "replace the existing file (backed up)".to_string(),
                ),
            ],
        };

        let options = candidates
            .into_iter()
            .zip(1u8..)
            .map(|((action, auto_applicable, description), rank)| ResolutionOption {
                action,
                rank,
                auto_applicable,
                description,
            })
            .collect();

        Diagnosis {
            conflict: entry.clone(),
            severity,
            options,
        }
    }
}

/// Caller choices per conflict key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decisions {
    choices: BTreeMap<String, ResolutionAction>,
}

impl Decisions {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose an action for the conflict with `key`
    #[must_use]
    pub fn with_choice(mut self, key: impl Into<String>, action: ResolutionAction) -> Self {
        self.choices.insert(key.into(), action);
        self
    }

    /// Explicit choice for a key
    #[must_use]
    pub fn choice(&self, key: &str) -> Option<&ResolutionAction> {
        self.choices.get(key)
    }

    /// Action to apply for a diagnosis
    ///
    /// An explicit choice wins when the diagnosis offers it. Without one, the
    /// recommended auto-applicable option is used. A rename choice without a
    /// name takes the generated one.
    ///
    /// # Errors
    /// Returns [`ConflictError::InvalidDecision`] when the choice is not
    /// offered, or when nothing is chosen and no option is auto-applicable.
    pub fn resolve(&self, diagnosis: &Diagnosis) -> Result<ResolutionAction, ConflictError> {
        let key = diagnosis.conflict.key();
        match self.choices.get(&key) {
            Some(action) if diagnosis.offers(action) => Ok(match action {
                ResolutionAction::Rename { new_name } if new_name.is_empty() => ResolutionAction::Rename {
                    new_name: diagnosis.conflict.rename.clone().unwrap_or_default(),
                },
                other => other.clone(),
            }),
            Some(action) => Err(ConflictError::InvalidDecision {
                key,
                action: action.to_string(),
            }),
            None => diagnosis
                .recommended()
                .map(|o| o.action.clone())
                .ok_or(ConflictError::InvalidDecision {
                    key,
                    action: "none".to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(conflict: ConflictKind, kind: NodeKind, path: &str) -> ConflictEntry {
        ConflictEntry {
            name: if conflict == ConflictKind::FileOverwrite {
                path.to_string()
            } else {
                "Thing".to_string()
            },
            kind,
            conflict,
            relative_path: Some(path.to_string()),
            existing_type: None,
            existing_path: Some(path.to_string()),
            definitions: vec!["Thing".to_string()],
            rename: (conflict != ConflictKind::FileOverwrite).then(|| "ZH_Thing".to_string()),
        }
    }

    #[test]
    fn severity_table_and_floors() {
        let table = SeverityTable::default();
        assert_eq!(table.for_kind(NodeKind::Object), Severity::Critical);
        assert_eq!(table.for_kind(NodeKind::Locomotor), Severity::Medium);
        assert_eq!(table.for_kind(NodeKind::FxList), Severity::Low);

        let fx_file = entry(ConflictKind::FileOverwrite, NodeKind::FxList, "Data/INI/FXList.ini");
        assert_eq!(table.for_conflict(&fx_file), Severity::Medium);

        let table = table.with_override(NodeKind::FxList, Severity::High);
        assert_eq!(table.for_kind(NodeKind::FxList), Severity::High);

        let parsed: SeverityTable = toml::from_str("[overrides]\nLocomotor = \"High\"\n").unwrap();
        assert_eq!(parsed.for_kind(NodeKind::Locomotor), Severity::High);
        assert_eq!(parsed.fallback, Severity::Medium);
    }

    #[test]
    fn duplicate_offers_three_auto_options() {
        let d = DiagnosisEngine::default().diagnose_one(&entry(ConflictKind::Duplicate, NodeKind::Weapon, "w.ini"));
        assert_eq!(d.options.len(), 3);
        assert!(d.options.iter().all(|o| o.auto_applicable));
        assert_eq!(
            d.recommended().unwrap().action,
            ResolutionAction::Rename {
                new_name: "ZH_Thing".to_string()
            }
        );
    }

    #[test]
    fn raw_file_overwrite_needs_explicit_choice() {
        let d = DiagnosisEngine::default().diagnose_one(&entry(
            ConflictKind::FileOverwrite,
            NodeKind::Model,
            "Art/W3D/AVTank.w3d",
        ));
        let overwrite = d.options.iter().find(|o| o.action == ResolutionAction::Overwrite).unwrap();
        assert!(!overwrite.auto_applicable);
        assert_eq!(d.recommended().unwrap().action, ResolutionAction::Skip);

        let text = DiagnosisEngine::default().diagnose_one(&entry(
            ConflictKind::FileOverwrite,
            NodeKind::Weapon,
            "Data/INI/Weapon.ini",
        ));
        assert_eq!(text.recommended().unwrap().action, ResolutionAction::Merge);
    }

    #[test]
    fn decisions_validate_against_options() {
        let d = DiagnosisEngine::default().diagnose_one(&entry(
            ConflictKind::NameCollision,
            NodeKind::Armor,
            "a.ini",
        ));
        let key = d.conflict.key();

        let explicit = Decisions::new().with_choice(key.clone(), ResolutionAction::Skip);
        assert_eq!(explicit.resolve(&d).unwrap(), ResolutionAction::Skip);

        let bad = Decisions::new().with_choice(key.clone(), ResolutionAction::Overwrite);
        assert!(bad.resolve(&d).unwrap_err().is_decision_error());

        let unnamed = Decisions::new().with_choice(
            key,
            ResolutionAction::Rename {
                new_name: String::new(),
            },
        );
        assert_eq!(
            unnamed.resolve(&d).unwrap(),
            ResolutionAction::Rename {
                new_name: "ZH_Thing".to_string()
            }
        );
    }

    #[test]
    fn diagnoses_sorted_most_severe_first() {
        let report = ConflictReport {
            unit: "Tank".to_string(),
            entries: vec![
                entry(ConflictKind::Duplicate, NodeKind::FxList, "fx.ini"),
                entry(ConflictKind::FileOverwrite, NodeKind::Object, "Data/INI/Object/Tank.ini"),
            ],
        };
        let diagnoses = DiagnosisEngine::default().diagnose(&report);
        assert_eq!(diagnoses[0].severity, Severity::Critical);
        assert_eq!(diagnoses[1].severity, Severity::Low);
    }
}
