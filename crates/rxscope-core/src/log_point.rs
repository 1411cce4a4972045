//! Log points: operators a user can opt into observing.

use crate::error::{DomainError, DomainResult};
use crate::identifier::OperatorIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Source Positions
// ============================================================================

/// Zero-based line/character position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// Inclusive range of positions, typically an editor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Creates a range, swapping the ends if given in reverse order.
    pub fn new(start: Position, end: Position) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Returns true if `position` lies within the range (inclusive).
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

/// A position inside a specific file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub position: Position,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, position: Position) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }
}

// ============================================================================
// Log Points
// ============================================================================

/// An operator the user may observe.
///
/// Unpaired with user intent a log point is a *recommendation*; once the
/// user opts in it is *enabled*. The `location` is where the operator itself
/// sits in the source, while `identifier` names the composition call and the
/// operator's index inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPoint {
    pub location: SourceLocation,
    pub identifier: OperatorIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl LogPoint {
    /// Creates a recommendation (not enabled).
    pub fn recommendation(
        location: SourceLocation,
        identifier: OperatorIdentifier,
        operator_name: Option<String>,
    ) -> Self {
        Self {
            location,
            identifier,
            operator_name,
            enabled: false,
        }
    }

    /// Returns a copy of this log point with the enabled flag set.
    #[must_use]
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    /// Uniqueness key; two log points are the same iff their keys match.
    #[must_use]
    pub fn key(&self) -> String {
        self.identifier.key()
    }

    /// Serializes to JSON text.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParseError` if serialization fails.
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self).map_err(|e| DomainError::parse("log point", e))
    }

    /// Parses JSON produced by [`LogPoint::to_json`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParseError` for malformed input.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        serde_json::from_str(json).map_err(|e| DomainError::parse("log point", e))
    }
}

/// A fresh generation of recommended log points for one file, as produced
/// by the static recommender after an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub file: String,
    pub log_points: Vec<LogPoint>,
}

impl Recommendations {
    pub fn new(file: impl Into<String>, log_points: Vec<LogPoint>) -> Self {
        Self {
            file: file.into(),
            log_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(enabled: bool, name: Option<&str>) -> LogPoint {
        LogPoint {
            location: SourceLocation::new("/src/app.rs", Position::new(12, 9)),
            identifier: OperatorIdentifier::new("/src/app.rs", 10, 4, 2),
            operator_name: name.map(str::to_string),
            enabled,
        }
    }

    #[test]
    fn test_log_point_json_round_trip() {
        for point in [
            sample(true, Some("map")),
            sample(false, Some("take")),
            sample(true, None),
        ] {
            let json = point.to_json().unwrap();
            assert_eq!(LogPoint::from_json(&json).unwrap(), point);
        }
    }

    #[test]
    fn test_log_point_from_malformed_json() {
        assert!(LogPoint::from_json("{\"location\":42}").is_err());
        assert!(LogPoint::from_json("not json").is_err());
    }

    #[test]
    fn test_with_enabled_keeps_identity() {
        let point = sample(false, Some("map"));
        let enabled = point.with_enabled(true);
        assert!(enabled.enabled);
        assert_eq!(enabled.key(), point.key());
    }

    #[test]
    fn test_range_contains_inclusive() {
        let range = Range::new(Position::new(2, 0), Position::new(4, 10));
        assert!(range.contains(Position::new(2, 0)));
        assert!(range.contains(Position::new(3, 99)));
        assert!(range.contains(Position::new(4, 10)));
        assert!(!range.contains(Position::new(4, 11)));
        assert!(!range.contains(Position::new(1, 50)));
    }

    #[test]
    fn test_range_normalizes_reversed_ends() {
        let range = Range::new(Position::new(5, 0), Position::new(1, 0));
        assert_eq!(range.start, Position::new(1, 0));
        assert!(range.contains(Position::new(3, 3)));
    }
}
