//! Migration state machine
//!
//! `Pending -> Analyzing -> Transferring -> Succeeded | Failed`, and
//! `Succeeded -> RolledBack` on an explicit later request. Analysis may also
//! fail before anything is transferred.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Lifecycle state of one migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    #[default]
    Pending,
    Analyzing,
    Transferring,
    Succeeded,
    Failed,
    RolledBack,
}

impl MigrationState {
    /// States reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [MigrationState] {
        use MigrationState::*;
        match self {
            Pending => &[Analyzing, Failed],
            Analyzing => &[Transferring, Failed],
            Transferring => &[Succeeded, Failed],
            Succeeded => &[RolledBack],
            Failed | RolledBack => &[],
        }
    }

    /// Whether no further automatic transition happens
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::RolledBack)
    }

    /// Validate a transition
    ///
    /// # Errors
    /// Returns [`StateError::IllegalTransition`] if `to` is not reachable.
    pub fn validate_transition(self, to: MigrationState) -> Result<(), StateError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(StateError::IllegalTransition { from: self, to })
        }
    }
}

impl Display for MigrationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Transferring => "transferring",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationState::*;

    #[test]
    fn happy_path_is_allowed() {
        for (from, to) in [
            (Pending, Analyzing),
            (Analyzing, Transferring),
            (Transferring, Succeeded),
            (Succeeded, RolledBack),
        ] {
            assert!(from.validate_transition(to).is_ok(), "{from} -> {to}");
        }
    }

    #[test]
    fn terminal_states_stay_terminal() {
        assert!(RolledBack.validate_transition(RolledBack).is_err());
        assert!(Failed.validate_transition(RolledBack).is_err());
        assert!(Transferring.validate_transition(RolledBack).is_err());
        assert_eq!(
            Pending.validate_transition(Succeeded),
            Err(StateError::IllegalTransition {
                from: Pending,
                to: Succeeded
            })
        );
    }
}
