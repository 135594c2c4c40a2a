//! Numeric field policies for the smart strategy
//!
//! Lookup order: exact key override, then substring rules in order, then the
//! default. The built-in rules make cost-like keys prefer the lower number.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of two numbers a field prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericPolicy {
    LowerWins,
    HigherWins,
}

impl NumericPolicy {
    /// Pick between the incoming and existing numbers; ties go to incoming
    #[must_use]
    pub fn prefers_incoming(self, incoming: f64, existing: f64) -> bool {
        match self {
            Self::LowerWins => incoming <= existing,
            Self::HigherWins => incoming >= existing,
        }
    }
}

/// Substring rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Substring of the field key (case-sensitive)
    pub pattern: String,

    /// Policy for matching keys
    pub policy: NumericPolicy,
}

static DEFAULT_RULES: Lazy<Vec<PolicyRule>> = Lazy::new(|| {
    ["Cost", "BuildTime"]
        .into_iter()
        .map(|pattern| PolicyRule {
            pattern: pattern.to_string(),
            policy: NumericPolicy::LowerWins,
        })
        .collect()
});

/// Field policy table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPolicyTable {
    /// Exact key overrides
    pub exact: BTreeMap<String, NumericPolicy>,

    /// Ordered substring rules, first match wins
    pub rules: Vec<PolicyRule>,

    /// Policy when nothing matches
    pub default: NumericPolicy,
}

impl Default for FieldPolicyTable {
    fn default() -> Self {
        Self {
            exact: BTreeMap::new(),
            rules: DEFAULT_RULES.clone(),
            default: NumericPolicy::HigherWins,
        }
    }
}

impl FieldPolicyTable {
    #[inline]
    #[must_use]
    pub fn with_exact(mut self, key: impl Into<String>, policy: NumericPolicy) -> Self {
        self.exact.insert(key.into(), policy);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_rule(mut self, pattern: impl Into<String>, policy: NumericPolicy) -> Self {
        self.rules.push(PolicyRule {
            pattern: pattern.into(),
            policy,
        });
        self
    }

    /// Policy for a field key
    #[must_use]
    pub fn policy_for(&self, key: &str) -> NumericPolicy {
        if let Some(policy) = self.exact.get(key) {
            return *policy;
        }
        self.rules
            .iter()
            .find(|r| key.contains(r.pattern.as_str()))
            .map_or(self.default, |r| r.policy)
    }
}

/// First numeric token of a value
///
/// Accepts plain numbers, percentages (`50%`) and `Label:Number` pairs.
#[must_use]
pub fn first_number(value: &str) -> Option<f64> {
    value.split_whitespace().find_map(|token| {
        let token = token.rsplit(':').next().unwrap_or(token);
        token
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
    })
}
