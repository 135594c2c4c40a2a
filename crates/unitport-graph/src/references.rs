//! Reference extraction
//!
//! A field is a reference when its key contains one of a table of substrings;
//! the first matching rule decides the referenced kind. Rules are ordered from
//! most to least specific, so `ProjectileDetonationFX` is an effect, not a
//! projectile.

use crate::node::NodeKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use unitport_block::Block;

/// Key substring mapped to the kind it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRule {
    /// Substring matched against field keys (case-sensitive)
    pub pattern: String,

    /// Kind of the referenced definition
    pub kind: NodeKind,
}

impl ReferenceRule {
    #[must_use]
    pub fn new(pattern: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }
}

/// One outgoing reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced definition name
    pub name: String,

    /// Kind implied by the field key
    pub kind: NodeKind,

    /// Field key the reference came from
    pub field: String,
}

static DEFAULT_RULES: Lazy<Vec<ReferenceRule>> = Lazy::new(|| {
    use NodeKind::*;
    [
        ("FXList", FxList),
        ("ParticleSystem", ParticleSystem),
        ("OCL", ObjectCreationList),
        ("CreationList", ObjectCreationList),
        ("CommandSet", CommandSet),
        ("CommandButton", CommandButton),
        ("SpecialPower", SpecialPower),
        ("Locomotor", Locomotor),
        ("FX", FxList),
        ("Projectile", Object),
        ("Weapon", Weapon),
        ("Armor", Armor),
        ("Body", Armor),
        ("Upgrade", Upgrade),
        ("Science", Science),
        ("Model", Model),
        ("Draw", Model),
        ("Texture", Texture),
        ("Image", Texture),
        ("Sound", Audio),
        ("Voice", Audio),
    ]
    .into_iter()
    .map(|(pattern, kind)| ReferenceRule::new(pattern, kind))
    .collect()
});

const DEFAULT_IGNORED_TOKENS: &[&str] = &[
    "NONE",
    "PRIMARY",
    "SECONDARY",
    "TERTIARY",
    "YES",
    "NO",
    "TRUE",
    "FALSE",
    "SET_NORMAL",
    "SET_NORMAL_UPGRADED",
    "SET_FREEFALL",
    "SET_WANDER",
    "SET_PANIC",
    "SET_TAXIING",
    "SET_SUPERSONIC",
    "SET_SLUGGISH",
];

const DEFAULT_IGNORED_KEYS: &[&str] = &[
    "ModelConditionFlags",
    "ModelConditionState",
    "WeaponSetFlags",
    "ArmorSetFlags",
];

/// Ordered reference rules plus the tokens and keys that never name a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceTable {
    /// Rules, first match wins
    pub rules: Vec<ReferenceRule>,

    /// Value tokens skipped when picking the referenced name (case-insensitive)
    pub ignored_tokens: BTreeSet<String>,

    /// Keys that match a rule but never hold references
    pub ignored_keys: BTreeSet<String>,

    /// Also scan fields inside sub-blocks (off: only depth-1 fields)
    pub include_nested: bool,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
            ignored_tokens: DEFAULT_IGNORED_TOKENS.iter().map(|t| (*t).to_string()).collect(),
            ignored_keys: DEFAULT_IGNORED_KEYS.iter().map(|k| (*k).to_string()).collect(),
            include_nested: false,
        }
    }
}

impl ReferenceTable {
    /// Table with only the given rules
    #[must_use]
    pub fn with_rules(rules: Vec<ReferenceRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Kind referenced by a field key
    #[must_use]
    pub fn kind_for_key(&self, key: &str) -> Option<NodeKind> {
        if self.ignored_keys.contains(key) {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| key.contains(rule.pattern.as_str()))
            .map(|rule| rule.kind)
    }

    /// Direct references of a block, deduplicated by name in first-seen order
    #[must_use]
    pub fn extract(&self, block: &Block) -> Vec<Reference> {
        let fields: Box<dyn Iterator<Item = &unitport_block::Field>> = if self.include_nested {
            Box::new(block.all_fields())
        } else {
            Box::new(block.fields.iter())
        };

        let mut seen = BTreeSet::new();
        let mut refs = Vec::new();
        for field in fields {
            let Some(kind) = self.kind_for_key(&field.key) else {
                continue;
            };
            let Some(name) = field.tokens().find(|t| self.is_name_token(t)) else {
                continue;
            };
            if seen.insert(name.to_string()) {
                refs.push(Reference {
                    name: name.to_string(),
                    kind,
                    field: field.key.clone(),
                });
            }
        }
        refs
    }

    fn is_name_token(&self, token: &str) -> bool {
        if self.ignored_tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            return false;
        }
        let numeric = token.trim_end_matches('%').parse::<f64>().is_ok();
        !numeric && !token.contains(':')
    }
}
