//! Wire frames exchanged over the bridge connection.
//!
//! Every frame is one JSON object on one line:
//!
//! ```text
//! controller → process   {"id":7,"method":"Runtime.evaluate","params":{...}}
//! process → controller   {"id":7,"result":{...}}
//!                        {"id":7,"error":{"code":-32000,"message":"..."}}
//!                        {"method":"Runtime.bindingCalled","params":{...}}
//! ```
//!
//! Frames carrying an `id` are responses; frames without one are events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::ProtocolError;

// ============================================================================
// Method Names
// ============================================================================

/// Domain hosting code evaluation and bindings in the observed process.
pub const RUNTIME_DOMAIN: &str = "Runtime";

/// Domain of the agent itself (event subscriptions).
pub const AGENT_DOMAIN: &str = "Agent";

/// Method names within their domains.
pub mod method {
    pub const ENABLE: &str = "enable";
    pub const ADD_BINDING: &str = "addBinding";
    pub const EVALUATE: &str = "evaluate";
    pub const SUBSCRIBE: &str = "subscribe";
}

/// Event names within their domains.
pub mod event {
    pub const BINDING_CALLED: &str = "bindingCalled";
}

/// Joins a domain and a method or event into `"<Domain>.<name>"`.
pub fn qualified(domain: &str, name: &str) -> String {
    format!("{domain}.{name}")
}

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes used in error responses.
pub mod code {
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The params do not fit the method.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The method ran and failed.
    pub const SERVER_ERROR: i64 = -32000;
}

// ============================================================================
// Frames
// ============================================================================

/// A correlated command sent by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Splits the method into domain and name.
    pub fn domain_and_name(&self) -> Option<(&str, &str)> {
        self.method.split_once('.')
    }
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Reply to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Creates a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    /// Converts into the outcome seen by the requester.
    ///
    /// An `error` field wins over a `result`; a response carrying neither
    /// fulfils with `null`.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, result) => Ok(result.unwrap_or(Value::Null)),
        }
    }
}

/// An unsolicited notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Event {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A frame received by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Event(Event),
}

impl Inbound {
    /// Parses one line of inbound text.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Json` for invalid JSON and
    /// `ProtocolError::InvalidMessage` for JSON that is neither a response
    /// nor an event.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;

        let is_response = value.get("id").is_some_and(|id| !id.is_null());
        if is_response {
            return Ok(Self::Response(serde_json::from_value(value)?));
        }
        if value.get("method").is_some() {
            return Ok(Self::Event(serde_json::from_value(value)?));
        }
        Err(ProtocolError::InvalidMessage(
            "frame has neither id nor method".to_string(),
        ))
    }
}

/// Serializes a frame as one newline-terminated line.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if serialization fails.
pub fn encode_line<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

// ============================================================================
// Params
// ============================================================================

/// Params of `Runtime.addBinding`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBindingParams {
    pub name: String,
}

/// Params of `Runtime.evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateParams {
    pub expression: String,
}

/// Params of `Agent.subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub events: Vec<String>,
}

/// Params of the `Runtime.bindingCalled` event.
///
/// `payload` is the text the observed process passed to the binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingCalledParams {
    pub name: String,
    pub payload: String,
}
