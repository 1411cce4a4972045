//! Controller-side bridge to an observed process.
//!
//! Sits on top of a [`Connection`]: performs the attach handshake, turns
//! log point changes into runtime bridge commands, and decodes binding
//! events into [`BridgeEvent`]s.
//!
//! The handshake runs outside the connection lock: the new connection is
//! staged as attaching, then published once the handshake succeeds. A
//! [`dispose`](ControllerBridge::dispose) during the handshake disposes the
//! staged connection, which fails the attach instead of leaving it hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rxscope_core::{OperatorIdentifier, RuntimeFlavor, TelemetryEvent};
use rxscope_protocol::message::{event, method};
use rxscope_protocol::{
    AddBindingParams, BindingCalledParams, EvaluateParams, ProtocolError, ProtocolVersion,
    ReadyPayload, RuntimeCommand, TelemetryPayload, READY_BINDING, RUNTIME_DOMAIN,
    TELEMETRY_BINDING,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionError};

/// Events emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The runtime announced itself; `None` if its flavor is unknown.
    RuntimeReady(Option<RuntimeFlavor>),
    /// A telemetry event forwarded by the runtime.
    Telemetry(TelemetryEvent),
}

/// Errors raised by the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge is already attached")]
    AlreadyAttached,

    #[error("Bridge is not attached")]
    NotAttached,

    #[error("Attach timed out after {0:?}")]
    AttachTimeout(Duration),

    #[error("Bridge was disposed while attaching")]
    Disposed,

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Default bound on the attach handshake.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

enum Slot {
    Detached,
    Attaching(Arc<Connection>),
    Attached(Arc<Connection>),
}

impl Slot {
    fn take(&mut self) -> Option<Arc<Connection>> {
        match std::mem::replace(self, Slot::Detached) {
            Slot::Detached => None,
            Slot::Attaching(connection) | Slot::Attached(connection) => Some(connection),
        }
    }
}

/// Controller end of the debugging bridge.
pub struct ControllerBridge {
    slot: Mutex<Slot>,
    attach_timeout: Duration,
    events: broadcast::Sender<BridgeEvent>,
    ready_fired: Arc<AtomicBool>,
}

impl ControllerBridge {
    /// Creates a detached bridge whose event channel holds `event_buffer`
    /// events per subscriber.
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            slot: Mutex::new(Slot::Detached),
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            events,
            ready_fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bounds the attach handshake by `attach_timeout`.
    #[must_use]
    pub fn with_attach_timeout(mut self, attach_timeout: Duration) -> Self {
        self.attach_timeout = attach_timeout;
        self
    }

    /// Subscribes to bridge events.
    ///
    /// Subscribe before [`attach`](Self::attach) to be sure to see
    /// `RuntimeReady`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Connects to the agent at `address` and installs the bindings.
    ///
    /// # Errors
    ///
    /// - `BridgeError::AlreadyAttached` if a connection exists or is being set up
    /// - `BridgeError::Connection` if connecting or any setup call fails
    /// - `BridgeError::AttachTimeout` if the handshake does not finish in time
    /// - `BridgeError::Disposed` if [`dispose`](Self::dispose) ran meanwhile
    ///
    /// On error the new connection is disposed.
    pub async fn attach(&self, address: &str) -> Result<(), BridgeError> {
        let connection = {
            let mut slot = self.slot.lock().await;
            if !matches!(*slot, Slot::Detached) {
                return Err(BridgeError::AlreadyAttached);
            }
            let connection = Arc::new(Connection::new(address));
            *slot = Slot::Attaching(Arc::clone(&connection));
            connection
        };

        let result = match timeout(self.attach_timeout, self.handshake(&connection)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::AttachTimeout(self.attach_timeout)),
        };

        let mut slot = self.slot.lock().await;
        let staged = matches!(&*slot, Slot::Attaching(staged) if Arc::ptr_eq(staged, &connection));
        let result = match result {
            Ok(()) if staged => {
                *slot = Slot::Attached(Arc::clone(&connection));
                info!(address, "Bridge attached");
                return Ok(());
            }
            Ok(()) => Err(BridgeError::Disposed),
            Err(e) => {
                if staged {
                    *slot = Slot::Detached;
                }
                Err(e)
            }
        };
        drop(slot);

        if let Err(e) = &result {
            warn!(address, error = %e, "Attach failed");
        }
        connection.dispose().await;
        result
    }

    async fn handshake(&self, connection: &Connection) -> Result<(), BridgeError> {
        connection.connect().await?;

        let ready = params(AddBindingParams {
            name: READY_BINDING.to_string(),
        })?;
        let telemetry = params(AddBindingParams {
            name: TELEMETRY_BINDING.to_string(),
        })?;

        tokio::try_join!(
            connection.request(RUNTIME_DOMAIN, method::ENABLE, json!({})),
            connection.request(RUNTIME_DOMAIN, method::ADD_BINDING, ready),
            connection.request(RUNTIME_DOMAIN, method::ADD_BINDING, telemetry),
        )?;

        let events = self.events.clone();
        let ready_fired = Arc::clone(&self.ready_fired);
        connection
            .subscribe(RUNTIME_DOMAIN, event::BINDING_CALLED, move |event_params: &Value| {
                on_binding_called(event_params, &events, &ready_fired);
            })
            .await?;

        Ok(())
    }

    pub async fn enable_operator_log_point(
        &self,
        identifier: OperatorIdentifier,
    ) -> Result<(), BridgeError> {
        self.evaluate(RuntimeCommand::Enable(identifier)).await
    }

    pub async fn disable_operator_log_point(
        &self,
        identifier: OperatorIdentifier,
    ) -> Result<(), BridgeError> {
        self.evaluate(RuntimeCommand::Disable(identifier)).await
    }

    /// Replaces the runtime's enabled set.
    pub async fn update_operator_log_points(
        &self,
        identifiers: Vec<OperatorIdentifier>,
    ) -> Result<(), BridgeError> {
        self.evaluate(RuntimeCommand::Update(identifiers)).await
    }

    async fn evaluate(&self, command: RuntimeCommand) -> Result<(), BridgeError> {
        let connection = match &*self.slot.lock().await {
            Slot::Attached(connection) => Arc::clone(connection),
            Slot::Detached | Slot::Attaching(_) => return Err(BridgeError::NotAttached),
        };

        let expression = command.to_expression()?;
        debug!(method = command.method_name(), "Evaluating runtime command");
        connection
            .request(RUNTIME_DOMAIN, method::EVALUATE, params(EvaluateParams { expression })?)
            .await?;
        Ok(())
    }

    pub async fn is_attached(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Attached(_))
    }

    /// Disposes the connection, if any, including one still attaching.
    pub async fn dispose(&self) {
        let connection = self.slot.lock().await.take();
        if let Some(connection) = connection {
            connection.dispose().await;
            debug!("Bridge disposed");
        }
    }
}

fn params<T: Serialize>(value: T) -> Result<Value, ProtocolError> {
    Ok(serde_json::to_value(value)?)
}

fn on_binding_called(
    params: &Value,
    events: &broadcast::Sender<BridgeEvent>,
    ready_fired: &AtomicBool,
) {
    let call: BindingCalledParams = match serde_json::from_value(params.clone()) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "Malformed binding event");
            return;
        }
    };

    let bridge_event = match call.name.as_str() {
        READY_BINDING => {
            if ready_fired.swap(true, Ordering::SeqCst) {
                return;
            }
            BridgeEvent::RuntimeReady(ready_flavor(&call.payload))
        }
        TELEMETRY_BINDING => match TelemetryPayload::decode(&call.payload) {
            Ok(telemetry) => BridgeEvent::Telemetry(telemetry),
            Err(e) => {
                warn!(error = %e, payload = %call.payload, "Dropping malformed telemetry");
                return;
            }
        },
        other => {
            debug!(binding = other, "Ignoring unknown binding");
            return;
        }
    };

    // No receivers is fine: nobody is listening yet.
    let _ = events.send(bridge_event);
}

fn ready_flavor(payload: &str) -> Option<RuntimeFlavor> {
    let Some(ready) = ReadyPayload::decode(payload) else {
        warn!(payload, "Undecodable ready payload, runtime flavor unknown");
        return None;
    };

    if let Err(e) = ready.protocol_version.ensure_compatible(&ProtocolVersion::CURRENT) {
        warn!(error = %e, "Runtime speaks an incompatible protocol version");
    }

    let flavor = ready.runtime_flavor();
    match flavor {
        Some(flavor) => info!(%flavor, "Runtime ready"),
        None => warn!(flavor = %ready.flavor, "Unknown runtime flavor"),
    }
    flavor
}
