//! Operator instrumentation.
//!
//! [`Instrumented`] decorates another composer: before delegating, it
//! wraps every operator of the composition call in a probe layer that
//! records the operator's lifecycle (subscribe, values, error, completion,
//! unsubscribe) as seen at the operator's output.
//!
//! # Architecture
//!
//! ```text
//!  pipe(ops) ──▶ Instrumented::compose ──▶ wrap(op_i) ──▶ inner.compose
//!                                             │
//!                                             │ spawn once per wrapped operator
//!                                             ▼
//!  probe layer ── Signal ──▶ unbounded queue ──▶ probe task ──▶ RuntimeHandle::forward
//!                                                  │
//!                                                  └─ awaits SourceResolver::resolve first
//! ```
//!
//! Signals are recorded synchronously and in order; the probe task holds
//! them until the operator's identifier is resolved, then forwards them in
//! the order they were recorded.

use std::fmt::Debug;
use std::sync::Arc;

use rxscope_core::{OperatorIdentifier, TelemetryEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bridge::RuntimeHandle;
use crate::compose::{CallSite, Compose};
use crate::error::RuntimeError;
use crate::resolve::SourceResolver;
use crate::stream::{Observable, Observer, Operator, StreamError, Subscriber, Subscription};

/// Composer decorator recording operator telemetry.
pub struct Instrumented<C> {
    inner: C,
    probes: ProbeFactory,
}

impl<C: Compose> Instrumented<C> {
    /// Wraps `inner`, forwarding telemetry through `runtime`.
    ///
    /// Probe tasks run on the tokio runtime current at construction time.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NoTokioRuntime` outside a tokio runtime.
    pub fn new(
        inner: C,
        runtime: RuntimeHandle,
        resolver: Arc<dyn SourceResolver>,
    ) -> Result<Self, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoTokioRuntime)?;
        Ok(Self {
            inner,
            probes: ProbeFactory {
                runtime,
                resolver,
                handle,
            },
        })
    }
}

impl<C: Compose> Compose for Instrumented<C> {
    fn compose<T>(&self, site: &CallSite, operators: Vec<Operator<T>>) -> Operator<T>
    where
        T: Debug + Send + 'static,
    {
        let wrapped = operators
            .into_iter()
            .enumerate()
            .map(|(index, operator)| self.probes.wrap(site, operator_index(site, index), operator))
            .collect();
        self.inner.compose(site, wrapped)
    }
}

/// Index of an operator within its composition call.
///
/// Keys only distinguish `u32::MAX` operators per call site; past that,
/// operators share the last index and a warning is logged.
fn operator_index(site: &CallSite, index: usize) -> u32 {
    u32::try_from(index).unwrap_or_else(|_| {
        warn!(%site, index, "Too many operators in one pipe, keys will collide");
        u32::MAX
    })
}

struct ProbeFactory {
    runtime: RuntimeHandle,
    resolver: Arc<dyn SourceResolver>,
    handle: Handle,
}

impl ProbeFactory {
    fn wrap<T>(&self, site: &CallSite, index: u32, operator: Operator<T>) -> Operator<T>
    where
        T: Debug + Send + 'static,
    {
        let probe = self.spawn_probe(site.clone(), index);
        let name = operator.name();

        Operator::new(name, move |source: Observable<T>| {
            let inner = operator.apply(source);
            let probe = probe.clone();
            Observable::new(move |downstream: Subscriber<T>| {
                let layer = Subscription::new();
                downstream.subscription().add_child(&layer);

                let on_unsubscribe = probe.clone();
                layer.add(move || on_unsubscribe.record(Signal::Unsubscribe));
                probe.record(Signal::Subscribe);

                let observer = ProbeObserver {
                    downstream,
                    probe: probe.clone(),
                    layer: layer.clone(),
                };
                inner.subscribe_linked(observer, &layer);
            })
        })
    }

    fn spawn_probe(&self, site: CallSite, index: u32) -> OperatorProbe {
        let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        let runtime = self.runtime.clone();
        let resolver = Arc::clone(&self.resolver);

        self.handle.spawn(async move {
            let identifier = resolver.resolve(&site, index).await;
            debug!(operator = %identifier, call_site = %site, "Operator identifier resolved");

            while let Some(signal) = rx.recv().await {
                runtime.forward(&signal.into_event(identifier.clone()));
            }
        });

        OperatorProbe { tx }
    }
}

/// Lifecycle signal of one operator, before its identifier is known.
#[derive(Debug)]
enum Signal {
    Subscribe,
    Next(String),
    Error(String),
    Completed,
    Unsubscribe,
}

impl Signal {
    fn into_event(self, operator: OperatorIdentifier) -> TelemetryEvent {
        match self {
            Signal::Subscribe => TelemetryEvent::subscribe(operator),
            Signal::Next(value) => TelemetryEvent::next(operator, value),
            Signal::Error(error) => TelemetryEvent::error(operator, error),
            Signal::Completed => TelemetryEvent::completed(operator),
            Signal::Unsubscribe => TelemetryEvent::unsubscribe(operator),
        }
    }
}

#[derive(Clone)]
struct OperatorProbe {
    tx: mpsc::UnboundedSender<Signal>,
}

impl OperatorProbe {
    fn record(&self, signal: Signal) {
        // Closed only after the runtime shut down.
        let _ = self.tx.send(signal);
    }
}

struct ProbeObserver<T> {
    downstream: Subscriber<T>,
    probe: OperatorProbe,
    layer: Subscription,
}

impl<T: Debug + Send> Observer<T> for ProbeObserver<T> {
    fn next(&mut self, value: T) {
        self.probe.record(Signal::Next(format!("{value:?}")));
        self.downstream.next(value);
    }

    fn error(&mut self, error: StreamError) {
        self.probe.record(Signal::Error(error.to_string()));
        self.downstream.error(error);
        self.layer.unsubscribe();
    }

    fn complete(&mut self) {
        self.probe.record(Signal::Completed);
        self.downstream.complete();
        self.layer.unsubscribe();
    }
}
