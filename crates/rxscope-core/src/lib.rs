//! rxscope Core - Shared types for operator telemetry
//!
//! This crate provides the domain types shared between the controller
//! (`rxscope-controller`) and the observed process (`rxscope-runtime`):
//! operator identity, log points, telemetry events and the log point merge.
//!
//! Nothing here panics on bad input; malformed keys and payloads surface
//! as [`DomainError`].

pub mod error;
pub mod flavor;
pub mod identifier;
pub mod log_point;
pub mod merge;
pub mod telemetry;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use flavor::RuntimeFlavor;
pub use identifier::OperatorIdentifier;
pub use log_point::{LogPoint, Position, Range, Recommendations, SourceLocation};
pub use merge::merge;
pub use telemetry::{TelemetryEvent, TelemetryKind};
