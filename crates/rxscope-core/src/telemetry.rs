//! Operator lifecycle telemetry.

use crate::error::{DomainError, DomainResult};
use crate::identifier::OperatorIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle notifications an instrumented operator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryKind {
    Subscribe,
    Next,
    Error,
    Completed,
    Unsubscribe,
}

impl TelemetryKind {
    /// Returns true if events of this kind carry a text payload.
    pub fn carries_payload(&self) -> bool {
        matches!(self, Self::Next | Self::Error)
    }

    /// Returns true if this kind terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Completed)
    }

    /// Parses from the wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Subscribe" => Some(Self::Subscribe),
            "Next" => Some(Self::Next),
            "Error" => Some(Self::Error),
            "Completed" => Some(Self::Completed),
            "Unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe => write!(f, "Subscribe"),
            Self::Next => write!(f, "Next"),
            Self::Error => write!(f, "Error"),
            Self::Completed => write!(f, "Completed"),
            Self::Unsubscribe => write!(f, "Unsubscribe"),
        }
    }
}

/// One lifecycle notification from one operator instance.
///
/// Fields are private: an event is immutable once built, and the
/// constructors guarantee that only `Next` and `Error` carry a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    kind: TelemetryKind,
    payload: Option<String>,
    operator: OperatorIdentifier,
}

impl TelemetryEvent {
    pub fn subscribe(operator: OperatorIdentifier) -> Self {
        Self {
            kind: TelemetryKind::Subscribe,
            payload: None,
            operator,
        }
    }

    pub fn next(operator: OperatorIdentifier, value: impl Into<String>) -> Self {
        Self {
            kind: TelemetryKind::Next,
            payload: Some(value.into()),
            operator,
        }
    }

    pub fn error(operator: OperatorIdentifier, error: impl Into<String>) -> Self {
        Self {
            kind: TelemetryKind::Error,
            payload: Some(error.into()),
            operator,
        }
    }

    pub fn completed(operator: OperatorIdentifier) -> Self {
        Self {
            kind: TelemetryKind::Completed,
            payload: None,
            operator,
        }
    }

    pub fn unsubscribe(operator: OperatorIdentifier) -> Self {
        Self {
            kind: TelemetryKind::Unsubscribe,
            payload: None,
            operator,
        }
    }

    /// Builds an event from loose parts, validating the payload rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPayload` if a `Next`/`Error` event has no
    /// payload, or any other kind has one.
    pub fn from_parts(
        kind: TelemetryKind,
        payload: Option<String>,
        operator: OperatorIdentifier,
    ) -> DomainResult<Self> {
        match (kind.carries_payload(), payload.is_some()) {
            (true, false) => Err(DomainError::InvalidPayload {
                kind: kind.to_string(),
                reason: "payload is required".to_string(),
            }),
            (false, true) => Err(DomainError::InvalidPayload {
                kind: kind.to_string(),
                reason: "payload is not allowed".to_string(),
            }),
            _ => Ok(Self {
                kind,
                payload,
                operator,
            }),
        }
    }

    pub fn kind(&self) -> TelemetryKind {
        self.kind
    }

    /// Value text for `Next`, error text for `Error`, `None` otherwise.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn operator(&self) -> &OperatorIdentifier {
        &self.operator
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "[{}] {}: {}", self.operator, self.kind, payload),
            None => write!(f, "[{}] {}", self.operator, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> OperatorIdentifier {
        OperatorIdentifier::new("src/main.rs", 3, 8, 1)
    }

    #[test]
    fn test_constructors_enforce_payload_rule() {
        assert_eq!(TelemetryEvent::next(op(), "2").payload(), Some("2"));
        assert_eq!(TelemetryEvent::error(op(), "boom").payload(), Some("boom"));
        assert_eq!(TelemetryEvent::subscribe(op()).payload(), None);
        assert_eq!(TelemetryEvent::completed(op()).payload(), None);
        assert_eq!(TelemetryEvent::unsubscribe(op()).payload(), None);
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(TelemetryEvent::from_parts(TelemetryKind::Next, None, op()).is_err());
        assert!(
            TelemetryEvent::from_parts(TelemetryKind::Completed, Some("x".into()), op()).is_err()
        );
        let event =
            TelemetryEvent::from_parts(TelemetryKind::Error, Some("bad".into()), op()).unwrap();
        assert_eq!(event.kind(), TelemetryKind::Error);
        assert_eq!(event.operator(), &op());
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            TelemetryKind::Subscribe,
            TelemetryKind::Next,
            TelemetryKind::Error,
            TelemetryKind::Completed,
            TelemetryKind::Unsubscribe,
        ] {
            assert_eq!(TelemetryKind::from_name(&kind.to_string()), Some(kind));
        }
        assert_eq!(TelemetryKind::from_name("Complete"), None);
        assert!(TelemetryKind::Completed.is_terminal());
        assert!(!TelemetryKind::Unsubscribe.is_terminal());
    }

    #[test]
    fn test_display() {
        let event = TelemetryEvent::next(op(), "42");
        assert_eq!(event.to_string(), "[src/main.rs-3:8-1] Next: 42");
    }
}
