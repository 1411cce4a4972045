//! Session manager commands, errors, and notifications.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rxscope_core::{RuntimeFlavor, TelemetryEvent};
use thiserror::Error;
use tokio::sync::oneshot;

use super::lifecycle::Session;

// ============================================================================
// External Events
// ============================================================================

/// A debugger started a session somewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSessionStarted {
    /// Unique id of the debug session.
    pub id: String,
    /// Debugger kind, e.g. `lldb`.
    pub kind: String,
    /// Parent session id for sub-sessions; those are not attached.
    pub parent: Option<String>,
    /// Agent address of the observed process, if the launcher knows it.
    pub address: Option<String>,
}

impl DebugSessionStarted {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parent: None,
            address: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle of one session. Never leaves `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Attaching,
    /// Attached; the runtime flavor if it was recognized.
    Ready(Option<RuntimeFlavor>),
    /// The single attach attempt failed.
    Failed(String),
    Terminated,
}

impl SessionState {
    /// The attach outcome, or `None` while it is still undecided.
    pub fn attach_outcome(&self) -> Option<Result<Option<RuntimeFlavor>, SessionError>> {
        match self {
            Self::Idle | Self::Attaching => None,
            Self::Ready(flavor) => Some(Ok(*flavor)),
            Self::Failed(reason) => Some(Err(SessionError::AttachFailed(reason.clone()))),
            Self::Terminated => Some(Err(SessionError::Terminated)),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Attaching => write!(f, "attaching"),
            Self::Ready(Some(flavor)) => write!(f, "ready ({flavor})"),
            Self::Ready(None) => write!(f, "ready (unknown runtime)"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub kind: String,
    pub address: String,
    pub state: SessionState,
}

// ============================================================================
// Notifications
// ============================================================================

/// Published by sessions to every subscriber of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    Ready {
        session_id: String,
        flavor: Option<RuntimeFlavor>,
    },
    AttachFailed {
        session_id: String,
        reason: String,
    },
    Telemetry {
        session_id: String,
        event: TelemetryEvent,
        received_at: DateTime<Utc>,
    },
    Terminated {
        session_id: String,
    },
}

impl SessionNotification {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Ready { session_id, .. }
            | Self::AttachFailed { session_id, .. }
            | Self::Telemetry { session_id, .. }
            | Self::Terminated { session_id } => session_id,
        }
    }
}

// ============================================================================
// Session Manager Commands
// ============================================================================

/// Commands sent to the session manager actor.
///
/// Sessions are handed out as `Arc`s so that awaiting an attach or a
/// teardown never blocks the actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Create and start attaching a session. Responds `false` if the
    /// event was ignored.
    Started {
        event: DebugSessionStarted,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove a session from the active set, handing it back for teardown.
    Remove {
        session_id: String,
        respond_to: oneshot::Sender<Option<Arc<Session>>>,
    },

    GetSession {
        session_id: String,
        respond_to: oneshot::Sender<Option<Arc<Session>>>,
    },

    GetActiveSessions {
        respond_to: oneshot::Sender<Vec<SessionSummary>>,
    },
}

// ============================================================================
// Session Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("attach failed: {0}")]
    AttachFailed(String),

    #[error("session terminated")]
    Terminated,

    /// The response channel was closed before receiving a response.
    #[error("response channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxscope_core::OperatorIdentifier;

    #[test]
    fn test_attach_outcome() {
        assert!(SessionState::Idle.attach_outcome().is_none());
        assert!(SessionState::Attaching.attach_outcome().is_none());
        assert_eq!(
            SessionState::Ready(None).attach_outcome(),
            Some(Ok(None))
        );
        assert_eq!(
            SessionState::Failed("refused".to_string()).attach_outcome(),
            Some(Err(SessionError::AttachFailed("refused".to_string())))
        );
        assert_eq!(
            SessionState::Terminated.attach_outcome(),
            Some(Err(SessionError::Terminated))
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Attaching.to_string(), "attaching");
        assert_eq!(
            SessionState::Ready(None).to_string(),
            "ready (unknown runtime)"
        );
    }

    #[test]
    fn test_notification_session_id() {
        let notification = SessionNotification::Telemetry {
            session_id: "s1".to_string(),
            event: TelemetryEvent::subscribe(OperatorIdentifier::new("a.rs", 1, 1, 0)),
            received_at: Utc::now(),
        };
        assert_eq!(notification.session_id(), "s1");
    }

    #[test]
    fn test_started_builder() {
        let event = DebugSessionStarted::new("s1", "lldb")
            .with_parent("s0")
            .with_address("127.0.0.1:1");
        assert_eq!(event.parent.as_deref(), Some("s0"));
        assert_eq!(event.address.as_deref(), Some("127.0.0.1:1"));
    }
}
