//! Block-level field merge
//!
//! `existing` is the target installation's block, `incoming` the source's.
//! Keys are visited in a fixed order (existing keys first, then keys only the
//! incoming block has), so identical inputs always render identically.

use crate::policy::{first_number, FieldPolicyTable};
use crate::strategy::MergeStrategy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display, Formatter};
use unitport_block::Block;

/// Outcome for one field key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// Same value on both sides
    Identical,

    /// Only the incoming block has the key
    SourceOnly,

    /// Only the existing block has the key
    TargetOnly,

    /// Both sides differ; one value was chosen
    Modified,

    /// Repeated key; values merged as a set union
    Union,
}

impl Display for FieldStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identical => "identical",
            Self::SourceOnly => "source_only",
            Self::TargetOnly => "target_only",
            Self::Modified => "modified",
            Self::Union => "union",
        };
        f.write_str(s)
    }
}

/// Where a merged value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Both,
    Source,
    Target,
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Both => "both",
            Self::Source => "source",
            Self::Target => "target",
        };
        f.write_str(s)
    }
}

/// A merged value with its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedValue {
    pub value: String,
    pub provenance: Provenance,
}

/// Per-key merge result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMerge {
    /// Field key
    pub key: String,

    /// Outcome
    pub status: FieldStatus,

    /// Values the existing block had
    pub existing: Vec<String>,

    /// Values the incoming block had
    pub incoming: Vec<String>,

    /// Final values in output order
    pub values: Vec<MergedValue>,
}

/// Per-field report for one merged block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub block_type: String,
    pub name: String,
    pub strategy: MergeStrategy,
    pub fields: Vec<FieldMerge>,
}

impl MergeReport {
    /// Number of fields with a given status
    #[must_use]
    pub fn count(&self, status: FieldStatus) -> usize {
        self.fields.iter().filter(|f| f.status == status).count()
    }

    /// Counts per status
    #[must_use]
    pub fn summary(&self) -> BTreeMap<FieldStatus, usize> {
        let mut counts = BTreeMap::new();
        for field in &self.fields {
            *counts.entry(field.status).or_insert(0) += 1;
        }
        counts
    }

    /// Report entry for a key
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldMerge> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Merged block, its report, and the regenerated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBlock {
    pub block: Block,
    pub report: MergeReport,
    pub text: String,
}

/// Field-level merge engine
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    policies: FieldPolicyTable,
}

impl MergeEngine {
    #[inline]
    #[must_use]
    pub fn new(policies: FieldPolicyTable) -> Self {
        Self { policies }
    }

    #[inline]
    #[must_use]
    pub fn policies(&self) -> &FieldPolicyTable {
        &self.policies
    }

    /// Merge `incoming` into `existing`
    ///
    /// The result keeps the existing block's type and name. Its text keeps the
    /// existing block's layout, sub-blocks and comments; merged fields carry a
    /// `; merged: <status>` annotation.
    #[must_use]
    pub fn merge(&self, existing: &Block, incoming: &Block, strategy: MergeStrategy) -> MergedBlock {
        let mut keys: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for field in existing.fields.iter().chain(&incoming.fields) {
            if seen.insert(field.key.as_str()) {
                keys.push(field.key.as_str());
            }
        }

        let fields: Vec<FieldMerge> = keys
            .into_iter()
            .map(|key| self.merge_key(key, existing, incoming, strategy))
            .collect();

        let mut block = Block::new(existing.block_type.clone(), existing.name.clone());
        for field in &fields {
            for value in &field.values {
                block = block.with_field(field.key.clone(), value.value.clone());
            }
        }

        let report = MergeReport {
            block_type: existing.block_type.clone(),
            name: existing.name.clone(),
            strategy,
            fields,
        };
        tracing::debug!(
            block = %existing,
            modified = report.count(FieldStatus::Modified),
            "block merged"
        );

        let text = render(existing, &report);
        MergedBlock { block, report, text }
    }

    fn merge_key(&self, key: &str, existing: &Block, incoming: &Block, strategy: MergeStrategy) -> FieldMerge {
        let ev: Vec<String> = existing.field_values(key).into_iter().map(normalize).collect();
        let iv: Vec<String> = incoming.field_values(key).into_iter().map(normalize).collect();

        let tagged = |values: &[String], provenance: Provenance| -> Vec<MergedValue> {
            values
                .iter()
                .map(|v| MergedValue {
                    value: v.clone(),
                    provenance,
                })
                .collect()
        };

        let (status, values) = match (ev.as_slice(), iv.as_slice()) {
            ([], _) => (FieldStatus::SourceOnly, tagged(&iv, Provenance::Source)),
            (_, []) => (FieldStatus::TargetOnly, tagged(&ev, Provenance::Target)),
            ([e], [i]) if e == i => (FieldStatus::Identical, tagged(&ev, Provenance::Both)),
            ([e], [i]) => {
                let take_incoming = self.incoming_wins(key, i, e, strategy);
                let (value, provenance) = if take_incoming {
                    (i.clone(), Provenance::Source)
                } else {
                    (e.clone(), Provenance::Target)
                };
                (FieldStatus::Modified, vec![MergedValue { value, provenance }])
            }
            _ => union(&ev, &iv),
        };

        FieldMerge {
            key: key.to_string(),
            status,
            existing: ev,
            incoming: iv,
            values,
        }
    }

    fn incoming_wins(&self, key: &str, incoming: &str, existing: &str, strategy: MergeStrategy) -> bool {
        match strategy {
            MergeStrategy::SourceWins => true,
            MergeStrategy::TargetWins => false,
            MergeStrategy::Smart => match (first_number(incoming), first_number(existing)) {
                (Some(i), Some(e)) => self.policies.policy_for(key).prefers_incoming(i, e),
                _ => true,
            },
        }
    }
}

fn union(existing: &[String], incoming: &[String]) -> (FieldStatus, Vec<MergedValue>) {
    let incoming_set: HashSet<&String> = incoming.iter().collect();
    let existing_set: HashSet<&String> = existing.iter().collect();

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for value in existing {
        if seen.insert(value) {
            let provenance = if incoming_set.contains(value) {
                Provenance::Both
            } else {
                Provenance::Target
            };
            values.push(MergedValue {
                value: value.clone(),
                provenance,
            });
        }
    }
    for value in incoming {
        if seen.insert(value) {
            values.push(MergedValue {
                value: value.clone(),
                provenance: Provenance::Source,
            });
        }
    }

    let status = if incoming_set == existing_set {
        FieldStatus::Identical
    } else {
        FieldStatus::Union
    };
    (status, values)
}

/// Collapse internal whitespace
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn field_line(indent: &str, key: &str, value: &MergedValue, status: FieldStatus) -> String {
    match status {
        FieldStatus::Identical | FieldStatus::TargetOnly => format!("{indent}{key} = {}", value.value),
        _ => format!(
            "{indent}{key} = {} ; merged: {status} ({})",
            value.value, value.provenance
        ),
    }
}

/// Regenerate block text over the existing block's lines
fn render(existing: &Block, report: &MergeReport) -> String {
    if existing.lines.is_empty() {
        let mut out = format!("{} {}\n", existing.block_type, existing.name);
        for field in &report.fields {
            for value in &field.values {
                out.push_str(&field_line("  ", &field.key, value, field.status));
                out.push('\n');
            }
        }
        out.push_str("End\n");
        return out;
    }

    let field_lines: BTreeMap<usize, &str> = existing
        .fields
        .iter()
        .map(|f| (f.line, f.key.as_str()))
        .collect();
    let mut emitted = HashSet::new();
    let mut out = String::new();

    let source_only = |out: &mut String| {
        for field in report.fields.iter().filter(|f| f.status == FieldStatus::SourceOnly) {
            for value in &field.values {
                out.push_str(&field_line("  ", &field.key, value, field.status));
                out.push('\n');
            }
        }
    };

    // An unclosed block has no `End` to insert before; its new fields go last.
    let closing = existing.closed.then_some(existing.end_line);
    for line in &existing.lines {
        if Some(line.number) == closing {
            source_only(&mut out);
        }

        let Some(key) = field_lines.get(&line.number) else {
            out.push_str(&line.text);
            out.push('\n');
            continue;
        };
        if !emitted.insert(*key) {
            continue;
        }
        let indent: String = line.text.chars().take_while(|c| c.is_whitespace()).collect();
        if let Some(field) = report.field(key) {
            for value in &field.values {
                out.push_str(&field_line(&indent, key, value, field.status));
                out.push('\n');
            }
        }
    }
    if closing.is_none() {
        source_only(&mut out);
    }
    out
}
