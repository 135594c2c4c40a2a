//! Format vocabulary
//!
//! The sub-block openers and the recognized definition types are tied to one
//! game's data format, so they are plain data: embedded defaults that a
//! configuration file can replace.

use crate::error::BlockError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Single-word lines that open a sub-block
const DEFAULT_OPENERS: &[&str] = &[
    "ArmorSet",
    "WeaponSet",
    "Prerequisites",
    "UnitSpecificSounds",
    "UnitSpecificFX",
    "Turret",
    "AltTurret",
    "Nugget",
    "AnimationState",
    "IdleAnimationState",
    "ParticleSystem",
    "Sound",
    "ViewShake",
    "LightPulse",
    "TerrainScorch",
    "Tracer",
    "FXListAtBonePos",
    "CreateObject",
    "CreateDebris",
    "DeliverPayload",
    "FireWeapon",
];

/// Block types that define a named entity other definitions can reference
const DEFAULT_DEFINITION_TYPES: &[&str] = &[
    "Object",
    "ObjectReskin",
    "ChildObject",
    "Weapon",
    "Armor",
    "FXList",
    "ParticleSystem",
    "Locomotor",
    "CommandSet",
    "CommandButton",
    "Upgrade",
    "SpecialPower",
    "Science",
    "ObjectCreationList",
    "AudioEvent",
    "MappedImage",
    "DamageFX",
    "CrateData",
];

static DEFAULT_VOCABULARY: Lazy<ParserVocabulary> = Lazy::new(|| ParserVocabulary {
    openers: to_set(DEFAULT_OPENERS),
    definition_types: to_set(DEFAULT_DEFINITION_TYPES),
});

fn to_set(words: &[&str]) -> BTreeSet<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

/// Vocabulary consulted by the parser and the target indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserVocabulary {
    /// Whole-line single words that open a sub-block
    pub openers: BTreeSet<String>,

    /// Recognized top-level definition types
    pub definition_types: BTreeSet<String>,
}

impl Default for ParserVocabulary {
    fn default() -> Self {
        DEFAULT_VOCABULARY.clone()
    }
}

impl ParserVocabulary {
    /// Vocabulary with no openers and no definition types
    #[must_use]
    pub fn empty() -> Self {
        Self {
            openers: BTreeSet::new(),
            definition_types: BTreeSet::new(),
        }
    }

    /// Add a single-word opener
    #[must_use]
    pub fn with_opener(mut self, word: impl Into<String>) -> Self {
        self.openers.insert(word.into());
        self
    }

    /// Add a definition type
    #[must_use]
    pub fn with_definition_type(mut self, block_type: impl Into<String>) -> Self {
        self.definition_types.insert(block_type.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn is_opener(&self, word: &str) -> bool {
        self.openers.contains(word)
    }

    #[inline]
    #[must_use]
    pub fn is_definition_type(&self, block_type: &str) -> bool {
        self.definition_types.contains(block_type)
    }

    /// Reject entries the line grammar could never match
    ///
    /// # Errors
    /// Returns [`BlockError::InvalidVocabulary`] for empty words or words
    /// containing whitespace or `=`.
    pub fn validate(&self) -> Result<(), BlockError> {
        let all = self.openers.iter().chain(&self.definition_types);

        for word in all {
            if word.is_empty() || word.contains(char::is_whitespace) || word.contains('=') {
                return Err(BlockError::InvalidVocabulary(word.clone()));
            }
        }
        Ok(())
    }
}
