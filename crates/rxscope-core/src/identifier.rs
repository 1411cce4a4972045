//! Operator identity.

use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of one operator inside one composition call.
///
/// `line` and `character` are the zero-based position of the composition
/// call itself; every operator passed to that call shares them and is told
/// apart by `operator_index`.
///
/// Identifiers come from two places: the static recommender working on
/// source text, and the runtime instrumentation reconstructing them from a
/// captured caller location. Both must produce the same [`key`](Self::key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorIdentifier {
    pub file_name: String,
    pub line: u32,
    pub character: u32,
    pub operator_index: u32,
}

impl OperatorIdentifier {
    /// Creates an identifier from zero-based coordinates.
    pub fn new(file_name: impl Into<String>, line: u32, character: u32, operator_index: u32) -> Self {
        Self {
            file_name: file_name.into(),
            line,
            character,
            operator_index,
        }
    }

    /// Creates an identifier from a one-based caller location, as reported
    /// by `std::panic::Location`.
    pub fn from_caller_location(
        file_name: impl Into<String>,
        line: u32,
        column: u32,
        operator_index: u32,
    ) -> Self {
        Self::new(
            file_name,
            line.saturating_sub(1),
            column.saturating_sub(1),
            operator_index,
        )
    }

    /// Serialization key: `"<fileName>-<line>:<character>-<operatorIndex>"`.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}-{}:{}-{}",
            self.file_name, self.line, self.character, self.operator_index
        )
    }

    /// Key of the composition call this operator belongs to.
    ///
    /// All operators of one call share the same call-site key.
    #[must_use]
    pub fn call_site_key(&self) -> String {
        format!("{}:{}", self.line, self.character)
    }

    /// Returns true if both identifiers belong to the same composition call.
    pub fn same_call_site(&self, other: &OperatorIdentifier) -> bool {
        self.file_name == other.file_name
            && self.line == other.line
            && self.character == other.character
    }
}

impl fmt::Display for OperatorIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for OperatorIdentifier {
    type Err = DomainError;

    /// Parses a key produced by [`OperatorIdentifier::key`].
    ///
    /// File names may themselves contain `-`, so the key is split from the
    /// right.
    fn from_str(s: &str) -> DomainResult<Self> {
        let invalid = |reason: &str| DomainError::InvalidIdentifierKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };

        let (rest, index) = s
            .rsplit_once('-')
            .ok_or_else(|| invalid("missing operator index"))?;
        let (file_name, position) = rest
            .rsplit_once('-')
            .ok_or_else(|| invalid("missing position"))?;
        let (line, character) = position
            .split_once(':')
            .ok_or_else(|| invalid("position must be <line>:<character>"))?;

        if file_name.is_empty() {
            return Err(invalid("empty file name"));
        }

        Ok(Self {
            file_name: file_name.to_string(),
            line: line.parse().map_err(|_| invalid("line is not a number"))?,
            character: character
                .parse()
                .map_err(|_| invalid("character is not a number"))?,
            operator_index: index
                .parse()
                .map_err(|_| invalid("operator index is not a number"))?,
        })
    }
}
