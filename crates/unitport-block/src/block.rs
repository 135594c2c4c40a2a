//! Block model
//!
//! A [`Block`] is one `Type Name ... End` structure taken from a definition file,
//! together with its direct fields and the raw lines it was parsed from.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A raw source line with its 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// 1-based line number in the parsed text
    pub number: usize,

    /// Line text without the trailing newline
    pub text: String,
}

/// A `Key = Value` entry
///
/// Duplicate keys are legal in the format, so fields are kept as an ordered list
/// rather than a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Key with surrounding whitespace trimmed
    pub key: String,

    /// Value with any trailing `;` comment stripped and whitespace trimmed
    pub value: String,

    /// 1-based line the field was read from
    pub line: usize,
}

impl Field {
    /// Create a field
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, line: usize) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            line,
        }
    }

    /// Whitespace-separated value tokens
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.value.split_whitespace()
    }
}

/// One parsed top-level block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block type (`Object`, `Weapon`, `FXList`, ...)
    pub block_type: String,

    /// Instance name
    pub name: String,

    /// Direct (depth 1) fields in source order
    pub fields: Vec<Field>,

    /// Fields found inside sub-blocks (depth 2 and deeper)
    pub nested_fields: Vec<Field>,

    /// Number of sub-blocks opened inside this block
    pub sub_blocks: usize,

    /// Raw lines from the header through the closing `End`
    pub lines: Vec<SourceLine>,

    /// Header line number
    pub start_line: usize,

    /// Line of the closing `End`, or the last line of input when unclosed
    pub end_line: usize,

    /// False when input ended before the block was closed
    pub closed: bool,
}

impl Block {
    /// Create an empty block
    #[must_use]
    pub fn new(block_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            name: name.into(),
            fields: Vec::new(),
            nested_fields: Vec::new(),
            sub_blocks: 0,
            lines: Vec::new(),
            start_line: 0,
            end_line: 0,
            closed: true,
        }
    }

    /// Builder helper for tests and generated blocks
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let line = self.fields.len() + 1;
        self.fields.push(Field::new(key, value, line));
        self
    }

    /// `(type, name)` identity used when matching blocks across files
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        (&self.block_type, &self.name)
    }

    /// All values for `key`, in source order
    #[must_use]
    pub fn field_values(&self, key: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.key == key)
            .map(|f| f.value.as_str())
            .collect()
    }

    /// First value for `key`
    #[must_use]
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Direct and nested fields together
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().chain(self.nested_fields.iter())
    }

    /// Original source text of the block
    #[must_use]
    pub fn source_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Regenerate the block from its header and direct fields
    ///
    /// Sub-block bodies are not reproduced; use [`Block::source_text`] to keep them.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{} {}\n", self.block_type, self.name);
        for field in &self.fields {
            out.push_str(&format!("  {} = {}\n", field.key, field.value));
        }
        out.push_str("End\n");
        out
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.block_type, self.name)
    }
}
