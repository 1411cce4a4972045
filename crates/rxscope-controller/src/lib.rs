//! rxscope Controller - The debugger's side of rxscope
//!
//! This crate provides:
//! - A correlated request/response connection to a debug agent
//!   ([`connection`])
//! - The controller-side bridge: attach handshake, log point commands and
//!   decoded runtime events ([`bridge`])
//! - The log point manager, which keeps the user's enabled log points
//!   across source edits ([`log_points`])
//! - Debug session lifecycle ([`session`]) and controller settings
//!   ([`config`])
//!
//! # Wiring
//!
//! ```ignore
//! let config = ControllerConfig::load_default()?.with_env_overrides();
//! let log_points = spawn_log_point_manager(None);
//! let sessions = spawn_session_manager(config, log_points.clone());
//! sessions.session_started(DebugSessionStarted::new("1", "lldb")).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod connection;
pub mod log_points;
pub mod session;

pub use bridge::{BridgeError, BridgeEvent, ControllerBridge, DEFAULT_ATTACH_TIMEOUT};
pub use config::{ConfigError, ControllerConfig};
pub use connection::{Connection, ConnectionError};
pub use log_points::{spawn_log_point_manager, LogPointError, LogPointHandle, LogPointsChanged};
pub use session::{
    spawn_session_manager, DebugSessionStarted, Session, SessionError, SessionManagerHandle,
    SessionNotification, SessionState, SessionSummary,
};
