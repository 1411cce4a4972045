//! Log point actor commands, errors, and events.

use rxscope_core::{LogPoint, OperatorIdentifier, Range, Recommendations};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Log Point Commands
// ============================================================================

/// Commands sent to the log point actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum LogPointCommand {
    /// Enable a log point. Responds `true` if it was not enabled before.
    Enable {
        log_point: LogPoint,
        respond_to: oneshot::Sender<bool>,
    },

    /// Disable a log point. Responds `true` if it was enabled before.
    Disable {
        identifier: OperatorIdentifier,
        respond_to: oneshot::Sender<bool>,
    },

    /// Flip a log point. Responds with the new enabled state.
    Toggle {
        log_point: LogPoint,
        respond_to: oneshot::Sender<bool>,
    },

    /// Snapshot of all enabled log points.
    GetLogPoints {
        respond_to: oneshot::Sender<Vec<LogPoint>>,
    },

    /// The enabled log point for an identifier, if any.
    GetForIdentifier {
        identifier: OperatorIdentifier,
        respond_to: oneshot::Sender<Option<LogPoint>>,
    },

    /// Enabled log points of `file` whose location lies inside `range`.
    GetForSelection {
        file: String,
        range: Range,
        respond_to: oneshot::Sender<Vec<LogPoint>>,
    },

    /// Merge a fresh generation of recommendations for one file.
    ///
    /// Responds with the log points of that file that stayed enabled.
    Refresh {
        recommendations: Recommendations,
        respond_to: oneshot::Sender<Vec<LogPoint>>,
    },
}

// ============================================================================
// Log Point Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum LogPointError {
    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Log Point Events
// ============================================================================

/// Published whenever the enabled set actually changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPointsChanged {
    /// Full snapshot after the change.
    pub log_points: Vec<LogPoint>,
}

impl LogPointsChanged {
    /// Identifiers of the snapshot, in snapshot order.
    pub fn identifiers(&self) -> Vec<OperatorIdentifier> {
        self.log_points
            .iter()
            .map(|point| point.identifier.clone())
            .collect()
    }
}
