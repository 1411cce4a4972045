//! rxscope Protocol - Wire protocol for the debugging bridge
//!
//! This crate provides the frames, method names, command encoding and
//! binding payloads exchanged between the controller and the agent running
//! inside an observed process.

pub mod command;
pub mod message;
pub mod payload;
pub mod version;

use thiserror::Error;

pub use command::{RuntimeCommand, READY_BINDING, RUNTIME_BRIDGE_GLOBAL, TELEMETRY_BINDING};
pub use message::{
    encode_line, qualified, AddBindingParams, BindingCalledParams, ErrorObject, EvaluateParams,
    Event, Inbound, Request, Response, SubscribeParams, AGENT_DOMAIN, RUNTIME_DOMAIN,
};
pub use payload::{EventData, PayloadType, ReadyPayload, TelemetryPayload};
pub use version::{ProtocolVersion, VersionError};

/// Environment variable naming the address the in-process agent listens on.
///
/// Set by the launcher of an observed process; its presence is what turns
/// instrumentation on.
pub const AGENT_ADDRESS_ENV: &str = "RXSCOPE_AGENT_ADDR";

/// Conventional agent address, used by tools that are not told one.
pub const DEFAULT_AGENT_ADDRESS: &str = "127.0.0.1:9329";

/// Environment variable naming the source root used to resolve caller
/// locations into editor paths.
pub const SOURCE_ROOT_ENV: &str = "RXSCOPE_SOURCE_ROOT";

/// Errors raised while encoding or decoding protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame had an unexpected shape.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// An evaluation expression is not a runtime bridge command.
    #[error("Invalid command expression {expression:?}: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// A binding payload does not describe a valid event.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
