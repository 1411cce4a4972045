//! Log point manager using the actor pattern.
//!
//! Holds the user's enabled log points and keeps them aligned with fresh
//! recommendations after source edits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ LogPointHandle  │────▶│  LogPointActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!                                 ▲                        │
//!  Recommendations feed ──────────┘                        ▼
//!  (optional mpsc)                              Sessions re-push the
//!                                               enabled snapshot
//! ```

use rxscope_core::Recommendations;
use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;
mod manager;

pub use actor::LogPointActor;
pub use commands::{LogPointCommand, LogPointError, LogPointsChanged};
pub use handle::LogPointHandle;
pub use manager::LogPointManager;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawns the log point actor and returns a handle to it.
///
/// When `feed` is given, every [`Recommendations`] received on it is merged
/// into the enabled set as if [`LogPointHandle::refresh`] had been called.
pub fn spawn_log_point_manager(feed: Option<mpsc::Receiver<Recommendations>>) -> LogPointHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = LogPointActor::new(cmd_rx, feed, event_tx.clone());
    tokio::spawn(actor.run());

    LogPointHandle::new(cmd_tx, event_tx)
}
