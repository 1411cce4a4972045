//! Client interface for the session manager actor.

use rxscope_core::RuntimeFlavor;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{
    DebugSessionStarted, SessionCommand, SessionError, SessionNotification, SessionSummary,
};

/// Cheap-to-clone handle to the session manager.
///
/// # Usage
///
/// ```ignore
/// let mut notifications = sessions.subscribe();
/// sessions.session_started(DebugSessionStarted::new("1", "lldb")).await?;
/// let flavor = sessions.attach("1").await?;
/// ```
#[derive(Clone)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<SessionCommand>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionManagerHandle {
    pub fn new(
        sender: mpsc::Sender<SessionCommand>,
        notifications: broadcast::Sender<SessionNotification>,
    ) -> Self {
        Self {
            sender,
            notifications,
        }
    }

    /// Reports a debug session start.
    ///
    /// Returns `true` if a session was created; unsupported kinds,
    /// sub-sessions and known ids are ignored.
    ///
    /// # Errors
    ///
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn session_started(&self, event: DebugSessionStarted) -> Result<bool, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Started {
                event,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Reports a debug session end: the session is torn down and removed.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionNotFound` if the session is not active
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn session_terminated(&self, session_id: &str) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Remove {
                session_id: session_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        let session = rx
            .await
            .map_err(|_| SessionError::ChannelClosed)?
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        session.terminate().await;
        Ok(())
    }

    /// Waits for the session's attach attempt and returns the runtime
    /// flavor.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionNotFound` if the session is not active
    /// - `SessionError::AttachFailed` / `SessionError::Terminated` per
    ///   [`Session::attach`](super::Session::attach)
    pub async fn attach(&self, session_id: &str) -> Result<Option<RuntimeFlavor>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::GetSession {
                session_id: session_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        let session = rx
            .await
            .map_err(|_| SessionError::ChannelClosed)?
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        session.attach().await
    }

    /// Summaries of all active sessions, ordered by id.
    pub async fn active_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::GetActiveSessions { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }
}
