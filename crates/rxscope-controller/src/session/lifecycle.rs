//! One debug session: Idle → Attaching → Ready → Terminated.
//!
//! The attach attempt runs in its own task. Its outcome is published
//! through a `watch` channel, so every concurrent [`Session::attach`] call
//! observes the same single attempt.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rxscope_core::RuntimeFlavor;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::{SessionError, SessionNotification, SessionState, SessionSummary};
use crate::bridge::{BridgeEvent, ControllerBridge};
use crate::log_points::{LogPointHandle, LogPointsChanged};

pub struct Session {
    id: String,
    kind: String,
    address: String,
    bridge: ControllerBridge,
    log_points: LogPointHandle,
    notifications: broadcast::Sender<SessionNotification>,
    state: watch::Sender<SessionState>,
    cancel_token: CancellationToken,
}

impl Session {
    /// Creates an idle session.
    ///
    /// # Arguments
    ///
    /// * `address` - Agent address of the observed process
    /// * `event_buffer` - Capacity of the bridge's event channel
    /// * `attach_timeout` - Bound on the attach handshake
    /// * `notifications` - Where telemetry and state changes are published
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        address: impl Into<String>,
        event_buffer: usize,
        attach_timeout: Duration,
        log_points: LogPointHandle,
        notifications: broadcast::Sender<SessionNotification>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            id: id.into(),
            kind: kind.into(),
            address: address.into(),
            bridge: ControllerBridge::new(event_buffer).with_attach_timeout(attach_timeout),
            log_points,
            notifications,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            kind: self.kind.clone(),
            address: self.address.clone(),
            state: self.state(),
        }
    }

    /// Attaches to the observed process and waits until it is ready.
    ///
    /// The first call starts the attempt; later calls, concurrent or not,
    /// wait for and return the same outcome.
    ///
    /// # Errors
    ///
    /// - `SessionError::AttachFailed` if the attempt failed
    /// - `SessionError::Terminated` if the session ended first
    pub async fn attach(self: &Arc<Self>) -> Result<Option<RuntimeFlavor>, SessionError> {
        let started = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Attaching;
                true
            } else {
                false
            }
        });
        if started {
            debug!(session_id = %self.id, address = %self.address, "Attaching session");
            tokio::spawn(Arc::clone(self).drive());
        }

        let mut state = self.state.subscribe();
        let settled = state
            .wait_for(|state| state.attach_outcome().is_some())
            .await
            .map_err(|_| SessionError::ChannelClosed)?
            .attach_outcome();
        settled.unwrap_or(Err(SessionError::Terminated))
    }

    /// Ends the session: disposes the bridge and stops its task.
    ///
    /// An attach still in progress is abandoned and fails. Safe to call
    /// more than once.
    pub async fn terminate(&self) {
        let previous = self.state.send_replace(SessionState::Terminated);
        if previous == SessionState::Terminated {
            return;
        }

        self.cancel_token.cancel();
        self.bridge.dispose().await;
        info!(session_id = %self.id, "Session terminated");
        self.notify(SessionNotification::Terminated {
            session_id: self.id.clone(),
        });
    }

    /// Runs the attach attempt, then relays bridge events and log point
    /// changes until the session ends.
    async fn drive(self: Arc<Self>) {
        // Subscribe first so neither the ready event nor a change is missed.
        let mut bridge_events = self.bridge.subscribe_events();
        let mut changes = self.log_points.subscribe();

        if let Err(e) = self.bridge.attach(&self.address).await {
            let reason = e.to_string();
            let failed = self.state.send_if_modified(|state| {
                if *state == SessionState::Attaching {
                    *state = SessionState::Failed(reason.clone());
                    true
                } else {
                    false
                }
            });
            if failed {
                warn!(session_id = %self.id, error = %reason, "Session attach failed");
                self.notify(SessionNotification::AttachFailed {
                    session_id: self.id.clone(),
                    reason,
                });
            }
            return;
        }

        let mut changes_open = true;
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,

                event = bridge_events.recv() => match event {
                    Ok(BridgeEvent::RuntimeReady(flavor)) => self.on_ready(flavor).await,
                    Ok(BridgeEvent::Telemetry(event)) => {
                        self.notify(SessionNotification::Telemetry {
                            session_id: self.id.clone(),
                            event,
                            received_at: Utc::now(),
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %self.id, skipped, "Session lagged behind bridge events");
                    }
                    Err(RecvError::Closed) => break,
                },

                change = changes.recv(), if changes_open => match change {
                    Ok(LogPointsChanged { .. }) | Err(RecvError::Lagged(_)) => {
                        if matches!(self.state(), SessionState::Ready(_)) {
                            self.push_log_points().await;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!(session_id = %self.id, "Log point manager gone");
                        changes_open = false;
                    }
                },
            }
        }

        debug!(session_id = %self.id, "Session task stopped");
    }

    async fn on_ready(&self, flavor: Option<RuntimeFlavor>) {
        if *self.state.borrow() != SessionState::Attaching {
            return;
        }

        self.push_log_points().await;

        let ready = self.state.send_if_modified(|state| {
            if *state == SessionState::Attaching {
                *state = SessionState::Ready(flavor);
                true
            } else {
                false
            }
        });
        if ready {
            info!(session_id = %self.id, flavor = ?flavor, "Session ready");
            self.notify(SessionNotification::Ready {
                session_id: self.id.clone(),
                flavor,
            });
        }
    }

    /// Pushes the full enabled snapshot to the runtime.
    async fn push_log_points(&self) {
        let log_points = match self.log_points.log_points().await {
            Ok(log_points) => log_points,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Cannot read log points");
                return;
            }
        };

        let identifiers = log_points
            .into_iter()
            .map(|point| point.identifier)
            .collect::<Vec<_>>();
        let count = identifiers.len();

        match self.bridge.update_operator_log_points(identifiers).await {
            Ok(()) => debug!(session_id = %self.id, count, "Pushed log points"),
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to push log points"),
        }
    }

    fn notify(&self, notification: SessionNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
