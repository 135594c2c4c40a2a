//! Line-oriented block parser
//!
//! Grammar, one line at a time:
//! - blank lines and lines starting with `;` or `//` are ignored
//! - at depth 0, `Word Token` (capitalized first word, no `=`) opens a block
//! - `End` (any case) closes the innermost open block
//! - `Key = Value` at depth 1 is a field; deeper ones are kept as nested fields
//! - sub-blocks open on a single vocabulary word, or a capitalized `Word Word`
//!   line without `=`
//!
//! The parser never fails. Unbalanced input is reported through [`ParseIssue`]s
//! and the blocks are still returned with best-effort boundaries.

use crate::block::{Block, Field, SourceLine};
use crate::vocabulary::ParserVocabulary;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Kind of structural problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Input ended while a block was still open
    MissingEnd,

    /// `End` seen with no open block
    ExtraEnd,
}

impl IssueKind {
    /// Stable issue code
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingEnd => "MISSING_END",
            Self::ExtraEnd => "EXTRA_END",
        }
    }
}

/// Non-fatal structural issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    /// Issue kind
    pub kind: IssueKind,

    /// For `MISSING_END` the unclosed block's header line, otherwise the `End` line
    pub line: usize,

    /// `Type Name` of the affected block, when there is one
    pub block: Option<String>,
}

impl Display for ParseIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.block {
            Some(block) => write!(f, "{} at line {} ({block})", self.kind.code(), self.line),
            None => write!(f, "{} at line {}", self.kind.code(), self.line),
        }
    }
}

/// Result of one parse call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Top-level blocks in source order
    pub blocks: Vec<Block>,

    /// Structural issues in source order
    pub issues: Vec<ParseIssue>,
}

impl ParseOutcome {
    #[inline]
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Find a block by type and name
    #[must_use]
    pub fn find(&self, block_type: &str, name: &str) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| b.block_type == block_type && b.name == name)
    }

    /// Find a block by name regardless of type
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

/// Parser over a [`ParserVocabulary`]
#[derive(Debug, Clone, Default)]
pub struct BlockParser {
    vocabulary: ParserVocabulary,
}

impl BlockParser {
    /// Create parser with vocabulary
    #[inline]
    #[must_use]
    pub fn new(vocabulary: ParserVocabulary) -> Self {
        Self { vocabulary }
    }

    /// Vocabulary in use
    #[inline]
    #[must_use]
    pub fn vocabulary(&self) -> &ParserVocabulary {
        &self.vocabulary
    }

    /// Parse text into blocks and issues
    #[must_use]
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut current: Option<Block> = None;
        let mut depth = 0usize;
        let mut last_line = 0usize;

        for (idx, raw) in text.lines().enumerate() {
            let number = idx + 1;
            last_line = number;

            if let Some(block) = current.as_mut() {
                block.lines.push(SourceLine {
                    number,
                    text: raw.to_string(),
                });
            }

            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with("//") {
                continue;
            }
            let content = strip_comment(trimmed);
            if content.is_empty() {
                continue;
            }

            if content.eq_ignore_ascii_case("end") {
                if depth == 0 {
                    outcome.issues.push(ParseIssue {
                        kind: IssueKind::ExtraEnd,
                        line: number,
                        block: None,
                    });
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(mut block) = current.take() {
                        block.end_line = number;
                        outcome.blocks.push(block);
                    }
                }
                continue;
            }

            if depth == 0 {
                if let Some((block_type, name)) = block_header(content) {
                    let mut block = Block::new(block_type, name);
                    block.start_line = number;
                    block.lines.push(SourceLine {
                        number,
                        text: raw.to_string(),
                    });
                    current = Some(block);
                    depth = 1;
                }
                continue;
            }

            let Some(block) = current.as_mut() else {
                continue;
            };

            if let Some((key, value)) = content.split_once('=') {
                let field = Field::new(key.trim(), value.trim(), number);
                if depth == 1 {
                    block.fields.push(field);
                } else {
                    block.nested_fields.push(field);
                }
                continue;
            }

            if self.opens_sub_block(content) {
                block.sub_blocks += 1;
                depth += 1;
            }
        }

        if let Some(mut block) = current.take() {
            tracing::debug!(block = %block, depth, "input ended inside open block");
            outcome.issues.push(ParseIssue {
                kind: IssueKind::MissingEnd,
                line: block.start_line,
                block: Some(block.to_string()),
            });
            block.closed = false;
            block.end_line = last_line;
            outcome.blocks.push(block);
        }

        outcome
    }

    fn opens_sub_block(&self, content: &str) -> bool {
        let mut tokens = content.split_whitespace();
        let Some(first) = tokens.next() else {
            return false;
        };
        match tokens.next() {
            None => self.vocabulary.is_opener(first),
            Some(_) => is_capitalized_word(first),
        }
    }
}

/// Parse with the default vocabulary
#[must_use]
pub fn parse(text: &str) -> ParseOutcome {
    BlockParser::default().parse(text)
}

/// Text before the first `;`, trimmed
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

/// `Word Token` header at depth 0
fn block_header(content: &str) -> Option<(&str, &str)> {
    if content.contains('=') {
        return None;
    }
    let mut tokens = content.split_whitespace();
    let block_type = tokens.next()?;
    let name = tokens.next()?;
    is_capitalized_word(block_type).then_some((block_type, name))
}

fn is_capitalized_word(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
