//! File-level merge
//!
//! Blocks with the same `(type, name)` are merged and spliced over the existing
//! block's lines. Incoming-only blocks are appended, existing-only blocks are
//! left untouched.

use crate::engine::{MergeEngine, MergeReport};
use crate::error::MergeError;
use crate::strategy::MergeStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unitport_block::{Block, BlockParser};

/// Result of merging two definition files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMerge {
    /// Merged file text
    pub text: String,

    /// One report per merged block
    pub merged: Vec<MergeReport>,

    /// Names of incoming blocks appended to the file
    pub appended: Vec<String>,

    /// Incoming blocks not merged because the existing block is unclosed
    pub skipped: Vec<String>,
}

impl MergeEngine {
    /// Merge `incoming_text` into `existing_text`
    ///
    /// # Errors
    /// Returns [`MergeError::NoBlocks`] when the incoming text holds no blocks.
    pub fn merge_files(
        &self,
        parser: &BlockParser,
        existing_text: &str,
        incoming_text: &str,
        strategy: MergeStrategy,
    ) -> Result<FileMerge, MergeError> {
        let incoming = parser.parse(incoming_text);
        if incoming.blocks.is_empty() {
            return Err(MergeError::NoBlocks("incoming"));
        }
        let existing = parser.parse(existing_text);

        let by_identity: HashMap<(&str, &str), &Block> =
            existing.blocks.iter().map(|b| (b.identity(), b)).collect();

        let mut replacements: Vec<(usize, usize, String)> = Vec::new();
        let mut result = FileMerge {
            text: String::new(),
            merged: Vec::new(),
            appended: Vec::new(),
            skipped: Vec::new(),
        };
        let mut appended_text = String::new();

        for block in &incoming.blocks {
            match by_identity.get(&block.identity()) {
                Some(target) if target.closed => {
                    let merged = self.merge(target, block, strategy);
                    replacements.push((target.start_line, target.end_line, merged.text));
                    result.merged.push(merged.report);
                }
                Some(target) => {
                    tracing::warn!(block = %target, "existing block is unclosed, not merging");
                    result.skipped.push(block.name.clone());
                }
                None => {
                    appended_text.push_str(&block.source_text());
                    result.appended.push(block.name.clone());
                }
            }
        }
        replacements.sort_by_key(|(start, _, _)| *start);

        let newline = if existing_text.contains("\r\n") { "\r\n" } else { "\n" };
        let mut out = String::with_capacity(existing_text.len() + appended_text.len());
        let mut pending = replacements.iter().peekable();
        let mut skip_until = 0usize;

        for (idx, line) in existing_text.lines().enumerate() {
            let number = idx + 1;
            if number <= skip_until {
                continue;
            }
            if let Some((start, end, text)) = pending.peek() {
                if *start == number {
                    push_lines(&mut out, text, newline);
                    skip_until = *end;
                    pending.next();
                    continue;
                }
            }
            out.push_str(line);
            out.push_str(newline);
        }

        if !appended_text.is_empty() {
            if !out.is_empty() && !out.ends_with(&format!("{newline}{newline}")) {
                out.push_str(newline);
            }
            push_lines(&mut out, &appended_text, newline);
        }

        tracing::debug!(
            merged = result.merged.len(),
            appended = result.appended.len(),
            skipped = result.skipped.len(),
            "file merged"
        );
        result.text = out;
        Ok(result)
    }
}

fn push_lines(out: &mut String, text: &str, newline: &str) {
    for line in text.lines() {
        out.push_str(line);
        out.push_str(newline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EXISTING: &str = "\
; Weapons
Weapon GunA
  Damage = 10
End

Weapon GunB
  Damage = 5
End
";

    #[test]
    fn splices_merged_blocks_and_appends_new_ones() {
        let incoming = "Weapon GunB\n  Damage = 7\nEnd\nWeapon GunC\n  Damage = 1\nEnd\n";
        let result = MergeEngine::default()
            .merge_files(&BlockParser::default(), EXISTING, incoming, MergeStrategy::Smart)
            .unwrap();

        assert_eq!(
            result.text,
            "; Weapons\nWeapon GunA\n  Damage = 10\nEnd\n\nWeapon GunB\n  Damage = 7 ; merged: modified (source)\nEnd\n\nWeapon GunC\n  Damage = 1\nEnd\n"
        );
        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.appended, vec!["GunC".to_string()]);
    }

    #[test]
    fn identical_file_is_unchanged() {
        let result = MergeEngine::default()
            .merge_files(&BlockParser::default(), EXISTING, EXISTING, MergeStrategy::TargetWins)
            .unwrap();
        assert_eq!(result.text, EXISTING);
        assert!(result.appended.is_empty());
    }

    #[test]
    fn incoming_without_blocks_is_an_error() {
        let err = MergeEngine::default()
            .merge_files(&BlockParser::default(), EXISTING, "; nothing\n", MergeStrategy::Smart)
            .unwrap_err();
        assert!(matches!(err, MergeError::NoBlocks("incoming")));
    }

    #[test]
    fn preserves_crlf() {
        let existing = "Weapon GunA\r\n  Damage = 10\r\nEnd\r\n";
        let incoming = "Weapon GunA\n  Damage = 12\nEnd\n";
        let result = MergeEngine::default()
            .merge_files(&BlockParser::default(), existing, incoming, MergeStrategy::Smart)
            .unwrap();
        assert_eq!(result.text, "Weapon GunA\r\n  Damage = 12 ; merged: modified (source)\r\nEnd\r\n");
    }
}
