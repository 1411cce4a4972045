//! Errors raised by the domain types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier key could not be parsed back into its fields
    #[error("Invalid operator identifier key {key:?}: {reason}")]
    InvalidIdentifierKey { key: String, reason: String },

    /// A telemetry event was built with a payload that does not fit its kind
    #[error("Invalid payload for {kind} event: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// JSON text that does not describe the expected type
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

impl DomainError {
    /// Wraps a (de)serialization failure for `field`.
    pub fn parse<E: std::fmt::Display>(field: &str, err: E) -> Self {
        Self::ParseError {
            field: field.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
