//! Payloads passed through bindings from the observed process.

use rxscope_core::{OperatorIdentifier, RuntimeFlavor, TelemetryEvent, TelemetryKind};
use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;
use crate::ProtocolError;

// ============================================================================
// Telemetry Payload
// ============================================================================

/// Discriminator of binding payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadType {
    OperatorLogPoint,
}

/// Value or error text attached to `Next`/`Error` telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Value { value: String },
    Error { error: String },
}

/// Telemetry as sent through the telemetry binding:
///
/// ```json
/// {"type":"OperatorLogPoint","observableEvent":"Next","data":{"value":"4"},
///  "operator":{"fileName":"src/main.rs","line":3,"character":8,"operatorIndex":1}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(rename = "type")]
    pub payload_type: PayloadType,
    pub observable_event: TelemetryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
    pub operator: OperatorIdentifier,
}

impl TelemetryPayload {
    /// Encodes to the binding payload text.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Json` if serialization fails.
    pub fn encode(event: &TelemetryEvent) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&Self::from(event))?)
    }

    /// Decodes binding payload text into a telemetry event.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Json` for unparsable text and
    /// `ProtocolError::InvalidPayload` if the data does not fit the event.
    pub fn decode(text: &str) -> Result<TelemetryEvent, ProtocolError> {
        let payload: Self = serde_json::from_str(text)?;
        payload.into_event()
    }

    /// Converts into a telemetry event, validating the data field.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidPayload` if `data` is missing, present
    /// where it is not allowed, or of the wrong variant.
    pub fn into_event(self) -> Result<TelemetryEvent, ProtocolError> {
        let kind = self.observable_event;
        let payload = match (kind, self.data) {
            (TelemetryKind::Next, Some(EventData::Value { value })) => Some(value),
            (TelemetryKind::Error, Some(EventData::Error { error })) => Some(error),
            (TelemetryKind::Next | TelemetryKind::Error, data) => {
                return Err(ProtocolError::InvalidPayload(format!(
                    "{kind} event with mismatched data: {data:?}"
                )));
            }
            (_, None) => None,
            (_, Some(data)) => {
                return Err(ProtocolError::InvalidPayload(format!(
                    "{kind} event must not carry data: {data:?}"
                )));
            }
        };

        TelemetryEvent::from_parts(kind, payload, self.operator)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }
}

impl From<&TelemetryEvent> for TelemetryPayload {
    fn from(event: &TelemetryEvent) -> Self {
        let data = match (event.kind(), event.payload()) {
            (TelemetryKind::Next, Some(value)) => Some(EventData::Value {
                value: value.to_string(),
            }),
            (TelemetryKind::Error, Some(error)) => Some(EventData::Error {
                error: error.to_string(),
            }),
            _ => None,
        };

        Self {
            payload_type: PayloadType::OperatorLogPoint,
            observable_event: event.kind(),
            data,
            operator: event.operator().clone(),
        }
    }
}

// ============================================================================
// Ready Payload
// ============================================================================

/// Payload of the ready binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub flavor: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
}

impl ReadyPayload {
    /// Ready payload for the current process.
    pub fn current() -> Self {
        Self {
            flavor: RuntimeFlavor::current().to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Encodes to the binding payload text.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Json` if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes binding payload text; `None` if it is not a ready payload.
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// The announced flavor, `None` if unrecognized.
    pub fn runtime_flavor(&self) -> Option<RuntimeFlavor> {
        RuntimeFlavor::from_name(&self.flavor)
    }
}
