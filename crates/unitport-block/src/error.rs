//! Error types for the block parser
//!
//! Parsing itself never fails: malformed nesting is reported as a [`ParseIssue`]
//! value. Only vocabulary validation returns an error.
//!
//! [`ParseIssue`]: crate::ParseIssue

/// Errors raised while preparing the parser
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// Vocabulary word that the grammar can never match
    #[error("invalid vocabulary entry: '{0}'")]
    InvalidVocabulary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_error_display() {
        let err = BlockError::InvalidVocabulary("Weapon Set".to_string());
        assert_eq!(err.to_string(), "invalid vocabulary entry: 'Weapon Set'");
    }
}
