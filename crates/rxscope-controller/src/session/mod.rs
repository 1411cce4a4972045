//! Debug session lifecycle.
//!
//! A session is created when a supported debugger session starts, attaches
//! a [`ControllerBridge`](crate::bridge::ControllerBridge) to the observed
//! process, and keeps the runtime's enabled set in step with the log point
//! manager until the debugger session ends.
//!
//! # Architecture
//!
//! ```text
//!  debugger events          ┌──────────────────────┐
//! ─────────────────────────▶│ SessionManagerActor  │  HashMap<id, Arc<Session>>
//!  started / terminated     └──────────────────────┘
//!                                      │ spawns
//!                                      ▼
//! ┌─────────────────┐  changes  ┌─────────────┐  evaluate  ┌───────────────┐
//! │ LogPointHandle  │──────────▶│   Session   │───────────▶│ observed proc │
//! └─────────────────┘           └─────────────┘◀───────────└───────────────┘
//!                                      │          telemetry
//!                                      ▼
//!                          SessionNotification (broadcast)
//! ```

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;
mod lifecycle;

pub use actor::SessionManagerActor;
pub use commands::{
    DebugSessionStarted, SessionCommand, SessionError, SessionNotification, SessionState,
    SessionSummary,
};
pub use handle::SessionManagerHandle;
pub use lifecycle::Session;

use crate::config::ControllerConfig;
use crate::log_points::LogPointHandle;

/// Spawns the session manager and returns a handle to it.
///
/// Channel sizes come from `config`.
pub fn spawn_session_manager(
    config: ControllerConfig,
    log_points: LogPointHandle,
) -> SessionManagerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
    let (notification_tx, _) = broadcast::channel(config.event_buffer.max(1));

    let actor = SessionManagerActor::new(cmd_rx, config, log_points, notification_tx.clone());
    tokio::spawn(actor.run());

    SessionManagerHandle::new(cmd_tx, notification_tx)
}
