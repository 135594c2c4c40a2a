//! Merge strategies

use crate::error::MergeError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// How a field present on both sides with different values is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Incoming (source) value wins
    SourceWins,

    /// Existing (target) value wins
    TargetWins,

    /// Numeric policy per field, incoming value for non-numeric fields
    #[default]
    Smart,
}

impl MergeStrategy {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SourceWins => "source_wins",
            Self::TargetWins => "target_wins",
            Self::Smart => "smart",
        }
    }

    /// Every strategy, for exhaustive checks
    pub const ALL: [Self; 3] = [Self::SourceWins, Self::TargetWins, Self::Smart];
}

impl Display for MergeStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MergeStrategy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "source_wins" | "source" => Ok(Self::SourceWins),
            "target_wins" | "target" => Ok(Self::TargetWins),
            "smart" => Ok(Self::Smart),
            _ => Err(MergeError::UnknownStrategy(s.to_string())),
        }
    }
}
