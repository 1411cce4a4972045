//! Session manager actor - owns the set of active sessions.
//!
//! Only bookkeeping happens here. Attaching and tearing down sessions
//! await network I/O and run outside the actor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::commands::{DebugSessionStarted, SessionCommand, SessionNotification, SessionSummary};
use super::lifecycle::Session;
use crate::config::ControllerConfig;
use crate::log_points::LogPointHandle;

pub struct SessionManagerActor {
    receiver: mpsc::Receiver<SessionCommand>,
    sessions: HashMap<String, Arc<Session>>,
    config: ControllerConfig,
    log_points: LogPointHandle,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionManagerActor {
    pub fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        config: ControllerConfig,
        log_points: LogPointHandle,
        notifications: broadcast::Sender<SessionNotification>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            config,
            log_points,
            notifications,
        }
    }

    pub async fn run(mut self) {
        info!(kinds = ?self.config.supported_session_kinds, "Session manager starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Session manager stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Started { event, respond_to } => {
                let _ = respond_to.send(self.handle_started(event));
            }
            SessionCommand::Remove {
                session_id,
                respond_to,
            } => {
                let removed = self.sessions.remove(&session_id);
                if removed.is_some() {
                    debug!(%session_id, "Session removed");
                }
                let _ = respond_to.send(removed);
            }
            SessionCommand::GetSession {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.get(&session_id).cloned());
            }
            SessionCommand::GetActiveSessions { respond_to } => {
                let mut summaries: Vec<SessionSummary> =
                    self.sessions.values().map(|s| s.summary()).collect();
                summaries.sort_by(|a, b| a.id.cmp(&b.id));
                let _ = respond_to.send(summaries);
            }
        }
    }

    /// Creates a session and starts attaching it. Returns `false` if the
    /// event does not call for a session.
    fn handle_started(&mut self, event: DebugSessionStarted) -> bool {
        if !self.config.supports_kind(&event.kind) {
            debug!(session_id = %event.id, kind = %event.kind, "Ignoring unsupported session kind");
            return false;
        }
        if let Some(parent) = &event.parent {
            debug!(session_id = %event.id, %parent, "Ignoring sub-session");
            return false;
        }
        if self.sessions.contains_key(&event.id) {
            debug!(session_id = %event.id, "Session already known");
            return false;
        }

        let address = event
            .address
            .unwrap_or_else(|| self.config.agent_address.clone());
        let session = Arc::new(Session::new(
            event.id.clone(),
            event.kind,
            address,
            self.config.event_buffer,
            self.config.attach_timeout(),
            self.log_points.clone(),
            self.notifications.clone(),
        ));
        self.sessions.insert(event.id, Arc::clone(&session));

        // The outcome is reported through notifications.
        tokio::spawn(async move {
            let _ = session.attach().await;
        });
        true
    }
}
