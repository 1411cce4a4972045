//! Runtime-side bridge.
//!
//! Holds the set of enabled operator log points and decides which
//! telemetry leaves the process. The controller changes the set through
//! [`RuntimeCommand`]s evaluated by the agent; instrumentation calls
//! [`RuntimeHandle::forward`] for every lifecycle event it records.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rxscope_core::{OperatorIdentifier, TelemetryEvent};
use rxscope_protocol::RuntimeCommand;
use tracing::{debug, trace};

/// Sink receiving every forwarded telemetry event.
pub type SendFn = dyn Fn(&TelemetryEvent) + Send + Sync;

/// Entry point of the runtime-side bridge.
pub struct RuntimeBridge;

impl RuntimeBridge {
    /// Creates the bridge state and returns the handle to it.
    ///
    /// `send` is called synchronously from [`RuntimeHandle::forward`]; it
    /// must not block.
    pub fn init<F>(send: F) -> RuntimeHandle
    where
        F: Fn(&TelemetryEvent) + Send + Sync + 'static,
    {
        RuntimeHandle {
            state: Arc::new(State {
                enabled: Mutex::new(HashMap::new()),
                send: Mutex::new(Some(Arc::new(send))),
            }),
        }
    }
}

struct State {
    /// Enabled identifiers, keyed by identifier key.
    enabled: Mutex<HashMap<String, OperatorIdentifier>>,
    send: Mutex<Option<Arc<SendFn>>>,
}

/// Cheap-to-clone handle to the runtime-side bridge.
#[derive(Clone)]
pub struct RuntimeHandle {
    state: Arc<State>,
}

impl RuntimeHandle {
    fn enabled(&self) -> MutexGuard<'_, HashMap<String, OperatorIdentifier>> {
        self.state
            .enabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enable_operator_log_point(&self, identifier: OperatorIdentifier) {
        debug!(operator = %identifier, "Enabling operator log point");
        self.enabled().insert(identifier.key(), identifier);
    }

    pub fn disable_operator_log_point(&self, identifier: &OperatorIdentifier) {
        debug!(operator = %identifier, "Disabling operator log point");
        self.enabled().remove(&identifier.key());
    }

    /// Replaces the enabled set wholesale.
    pub fn update_operator_log_points(&self, identifiers: Vec<OperatorIdentifier>) {
        debug!(count = identifiers.len(), "Replacing enabled operator log points");
        let next = identifiers
            .into_iter()
            .map(|identifier| (identifier.key(), identifier))
            .collect();
        *self.enabled() = next;
    }

    pub fn is_enabled(&self, identifier: &OperatorIdentifier) -> bool {
        self.enabled().contains_key(&identifier.key())
    }

    /// Snapshot of the enabled set, sorted.
    pub fn enabled_identifiers(&self) -> Vec<OperatorIdentifier> {
        let mut identifiers: Vec<_> = self.enabled().values().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Applies a command received from the controller.
    pub fn execute(&self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::Enable(identifier) => self.enable_operator_log_point(identifier),
            RuntimeCommand::Disable(identifier) => self.disable_operator_log_point(&identifier),
            RuntimeCommand::Update(identifiers) => self.update_operator_log_points(identifiers),
        }
    }

    /// Sends `event` iff its operator is enabled.
    pub fn forward(&self, event: &TelemetryEvent) {
        if !self.is_enabled(event.operator()) {
            trace!(operator = %event.operator(), kind = %event.kind(), "Dropping telemetry for disabled operator");
            return;
        }

        let send = self
            .state
            .send
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(send) = send {
            send(event);
        }
    }

    /// Clears the enabled set and disconnects the sink.
    ///
    /// Later `forward` calls are no-ops.
    pub fn teardown(&self) {
        self.enabled().clear();
        *self
            .state
            .send
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Runtime bridge torn down");
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("enabled", &self.enabled().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (RuntimeHandle, Arc<Mutex<Vec<TelemetryEvent>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let handle = RuntimeBridge::init(move |event: &TelemetryEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (handle, sent)
    }

    fn id(index: u32) -> OperatorIdentifier {
        OperatorIdentifier::new("src/main.rs", 2, 4, index)
    }

    #[test]
    fn test_forward_only_enabled() {
        let (handle, sent) = capture();
        handle.forward(&TelemetryEvent::subscribe(id(0)));
        assert!(sent.lock().unwrap().is_empty());

        handle.enable_operator_log_point(id(0));
        handle.forward(&TelemetryEvent::subscribe(id(0)));
        handle.forward(&TelemetryEvent::subscribe(id(1)));
        assert_eq!(*sent.lock().unwrap(), vec![TelemetryEvent::subscribe(id(0))]);
    }

    #[test]
    fn test_disable_stops_forwarding() {
        let (handle, sent) = capture();
        handle.enable_operator_log_point(id(0));
        handle.disable_operator_log_point(&id(0));
        handle.forward(&TelemetryEvent::completed(id(0)));
        assert!(sent.lock().unwrap().is_empty());
        assert!(!handle.is_enabled(&id(0)));
    }

    #[test]
    fn test_update_replaces_set() {
        let (handle, _) = capture();
        handle.enable_operator_log_point(id(0));
        handle.update_operator_log_points(vec![id(2), id(1)]);
        assert_eq!(handle.enabled_identifiers(), vec![id(1), id(2)]);
    }

    #[test]
    fn test_execute_commands() {
        let (handle, _) = capture();
        handle.execute(RuntimeCommand::Enable(id(3)));
        assert!(handle.is_enabled(&id(3)));
        handle.execute(RuntimeCommand::Disable(id(3)));
        assert!(!handle.is_enabled(&id(3)));
        handle.execute(RuntimeCommand::Update(vec![id(4)]));
        assert_eq!(handle.enabled_identifiers(), vec![id(4)]);
    }

    #[test]
    fn test_teardown_disconnects_sink() {
        let (handle, sent) = capture();
        handle.enable_operator_log_point(id(0));
        handle.teardown();
        handle.enable_operator_log_point(id(0));
        handle.forward(&TelemetryEvent::subscribe(id(0)));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(handle.enabled_identifiers(), vec![id(0)]);
    }
}
