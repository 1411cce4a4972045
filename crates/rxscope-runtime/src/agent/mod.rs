//! In-process debug agent.
//!
//! The agent is the remote end of the controller's bridge connection. It
//! listens on TCP, serves one controller connection at a time, evaluates
//! runtime bridge commands and pushes telemetry back as binding events.
//! A controller connecting while another is attached gets an error
//! response to its first request and is disconnected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    DebugAgent    │◀── telemetry (mpsc) ── RuntimeHandle::forward
//! │                  │
//! │   TcpListener    │
//! └────────┬─────────┘
//!          │ accept()
//!          ├──────────────────────────────┐
//!          ▼                              ▼ (while busy)
//! ┌──────────────────┐     ┌──────────────────┐   AgentConnection::reject
//! │ AgentConnection  │────▶│  RuntimeHandle   │
//! │ (one controller) │     │  (enabled set)   │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! When a controller disconnects, the enabled set is cleared and telemetry
//! queued in the meantime is discarded; the next controller starts from
//! a clean slate and pushes its own snapshot.

mod connection;

pub use connection::AgentConnection;

use std::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rxscope_core::TelemetryEvent;
pub use rxscope_protocol::DEFAULT_AGENT_ADDRESS;
use rxscope_protocol::ProtocolError;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::RuntimeHandle;

/// TCP endpoint serving the controller.
pub struct DebugAgent {
    listener: TcpListener,
    runtime: RuntimeHandle,
    telemetry: Telemetry,
    cancel_token: CancellationToken,
    served: Arc<AtomicU64>,
}

type Telemetry = mpsc::UnboundedReceiver<TelemetryEvent>;

impl DebugAgent {
    /// Binds the listener.
    ///
    /// # Arguments
    ///
    /// * `address` - Socket address to listen on (port 0 picks a free port)
    /// * `runtime` - Handle commands are applied to
    /// * `telemetry` - Receiving end of the runtime bridge's sink
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        address: &str,
        runtime: RuntimeHandle,
        telemetry: Telemetry,
        cancel_token: CancellationToken,
    ) -> Result<Self, AgentError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| AgentError::Bind {
                address: address.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            runtime,
            telemetry,
            cancel_token,
            served: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Counter of controller connections served so far; rejected
    /// connections are not counted.
    pub fn served_connections(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.served)
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, AgentError> {
        self.listener
            .local_addr()
            .map_err(|e| AgentError::Io(e.to_string()))
    }

    /// Runs the agent until the cancellation token is triggered.
    pub async fn run(self) -> Result<(), AgentError> {
        info!(address = %self.local_addr()?, "Debug agent listening");
        let Self {
            listener,
            runtime,
            telemetry,
            cancel_token,
            served,
        } = self;

        // Exactly one of these is set: the receiver is either idle here or
        // owned by the task serving the attached controller.
        let mut idle = Some(telemetry);
        let mut active: Option<JoinHandle<Telemetry>> = None;
        let mut connection_counter: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Debug agent shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            connection_counter += 1;
                            let Some(mut telemetry) = idle.take() else {
                                warn!(peer = %peer, connection = connection_counter, "Controller already attached, rejecting connection");
                                tokio::spawn(AgentConnection::reject(stream, connection_counter));
                                continue;
                            };

                            served.fetch_add(1, Ordering::SeqCst);
                            info!(peer = %peer, connection = connection_counter, "Controller connected");

                            let connection =
                                AgentConnection::new(stream, runtime.clone(), connection_counter);
                            let token = cancel_token.clone();
                            active = Some(tokio::spawn(async move {
                                connection.run(&mut telemetry, &token).await;
                                info!(peer = %peer, "Controller disconnected");
                                telemetry
                            }));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }

                finished = join_active(&mut active), if active.is_some() => {
                    active = None;
                    let mut telemetry = finished.map_err(|e| AgentError::Io(e.to_string()))?;
                    reset(&runtime, &mut telemetry);
                    idle = Some(telemetry);
                }

                Some(event) = recv_idle(&mut idle) => {
                    trace!(operator = %event.operator(), "No controller attached, dropping telemetry");
                }
            }
        }

        Ok(())
    }
}

async fn join_active(active: &mut Option<JoinHandle<Telemetry>>) -> Result<Telemetry, JoinError> {
    match active {
        Some(task) => task.await,
        None => future::pending().await,
    }
}

async fn recv_idle(idle: &mut Option<Telemetry>) -> Option<TelemetryEvent> {
    match idle {
        Some(telemetry) => telemetry.recv().await,
        None => future::pending().await,
    }
}

/// Forgets the state left behind by a departed controller.
fn reset(runtime: &RuntimeHandle, telemetry: &mut Telemetry) {
    runtime.update_operator_log_points(Vec::new());

    let mut dropped = 0usize;
    while telemetry.try_recv().is_ok() {
        dropped += 1;
    }
    debug!(dropped, "Agent state reset");
}

/// Errors that can occur in agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to bind agent to {address}: {error}")]
    Bind { address: String, error: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
