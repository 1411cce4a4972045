//! Client interface for the log point actor.

use rxscope_core::{LogPoint, OperatorIdentifier, Range, Recommendations};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{LogPointCommand, LogPointError, LogPointsChanged};

// ============================================================================
// Log Point Handle
// ============================================================================

/// Cheap-to-clone handle to the log point actor.
///
/// Channel errors are mapped to `LogPointError::ChannelClosed`.
#[derive(Clone)]
pub struct LogPointHandle {
    sender: mpsc::Sender<LogPointCommand>,
    event_sender: broadcast::Sender<LogPointsChanged>,
}

impl LogPointHandle {
    pub fn new(
        sender: mpsc::Sender<LogPointCommand>,
        event_sender: broadcast::Sender<LogPointsChanged>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Enables a log point. Returns `true` if it was not enabled yet.
    pub async fn enable(&self, log_point: LogPoint) -> Result<bool, LogPointError> {
        self.request(|respond_to| LogPointCommand::Enable {
            log_point,
            respond_to,
        })
        .await
    }

    /// Disables a log point. Returns `true` if it was enabled.
    pub async fn disable(&self, identifier: OperatorIdentifier) -> Result<bool, LogPointError> {
        self.request(|respond_to| LogPointCommand::Disable {
            identifier,
            respond_to,
        })
        .await
    }

    /// Flips a log point and returns whether it is now enabled.
    pub async fn toggle(&self, log_point: LogPoint) -> Result<bool, LogPointError> {
        self.request(|respond_to| LogPointCommand::Toggle {
            log_point,
            respond_to,
        })
        .await
    }

    /// Snapshot of the enabled log points.
    pub async fn log_points(&self) -> Result<Vec<LogPoint>, LogPointError> {
        self.request(|respond_to| LogPointCommand::GetLogPoints { respond_to })
            .await
    }

    pub async fn log_point_for_identifier(
        &self,
        identifier: OperatorIdentifier,
    ) -> Result<Option<LogPoint>, LogPointError> {
        self.request(|respond_to| LogPointCommand::GetForIdentifier {
            identifier,
            respond_to,
        })
        .await
    }

    /// Enabled log points of `file` whose location lies inside `range`.
    pub async fn log_points_for_selection(
        &self,
        file: impl Into<String>,
        range: Range,
    ) -> Result<Vec<LogPoint>, LogPointError> {
        let file = file.into();
        self.request(|respond_to| LogPointCommand::GetForSelection {
            file,
            range,
            respond_to,
        })
        .await
    }

    /// Merges a fresh generation of recommendations for one file.
    ///
    /// Returns the log points of that file that stayed enabled. Usually the
    /// recommendation feed given to
    /// [`spawn_log_point_manager`](super::spawn_log_point_manager) drives
    /// this instead.
    pub async fn refresh(
        &self,
        recommendations: Recommendations,
    ) -> Result<Vec<LogPoint>, LogPointError> {
        self.request(|respond_to| LogPointCommand::Refresh {
            recommendations,
            respond_to,
        })
        .await
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LogPointsChanged> {
        self.event_sender.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> LogPointCommand,
    ) -> Result<T, LogPointError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| LogPointError::ChannelClosed)?;
        rx.await.map_err(|_| LogPointError::ChannelClosed)
    }
}
