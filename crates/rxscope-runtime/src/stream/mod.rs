//! Push-based reactive streams.
//!
//! A minimal observable model: an [`Observable`] produces values into a
//! [`Subscriber`], which forwards them to an [`Observer`] until the stream
//! errors, completes, or its [`Subscription`] is closed. An [`Operator`]
//! turns one observable into another; pipelines are built by composing
//! operators (see [`crate::compose`]).
//!
//! # Architecture
//!
//! ```text
//! source ──▶ Subscriber ──▶ operator observer ──▶ Subscriber ──▶ consumer
//!              │                                    │
//!              └────── child Subscription ◀─────────┘  (unsubscribe cascades upstream)
//! ```

mod operators;
mod subscription;

pub use operators::{filter, map, take, tap};
pub use subscription::Subscription;

use std::fmt;
use std::sync::{mpsc, Arc};

// ============================================================================
// Observers
// ============================================================================

/// Error carried by a failing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError(String);

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StreamError {}

/// Receiver of stream notifications.
pub trait Observer<T>: Send {
    fn next(&mut self, value: T);
    fn error(&mut self, error: StreamError);
    fn complete(&mut self);
}

/// A single stream notification, as delivered to channel observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<T> {
    Next(T),
    Error(StreamError),
    Completed,
}

impl<T: Send> Observer<T> for mpsc::Sender<Notification<T>> {
    fn next(&mut self, value: T) {
        let _ = self.send(Notification::Next(value));
    }

    fn error(&mut self, error: StreamError) {
        let _ = self.send(Notification::Error(error));
    }

    fn complete(&mut self) {
        let _ = self.send(Notification::Completed);
    }
}

// ============================================================================
// Subscriber
// ============================================================================

/// Guards an observer with the stream grammar: any number of `next`, then
/// at most one `error` or `complete`, nothing after the subscription closes.
///
/// Terminal notifications close the subscription, which runs its teardowns.
pub struct Subscriber<T> {
    observer: Box<dyn Observer<T>>,
    subscription: Subscription,
    stopped: bool,
}

impl<T> Subscriber<T> {
    pub fn new(observer: impl Observer<T> + 'static) -> Self {
        Self::with_subscription(observer, Subscription::new())
    }

    pub fn with_subscription(observer: impl Observer<T> + 'static, subscription: Subscription) -> Self {
        Self {
            observer: Box::new(observer),
            subscription,
            stopped: false,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Returns true once nothing more will be delivered.
    pub fn is_closed(&self) -> bool {
        self.stopped || self.subscription.is_closed()
    }
}

impl<T> Observer<T> for Subscriber<T>
where
    T: Send,
{
    fn next(&mut self, value: T) {
        if !self.is_closed() {
            self.observer.next(value);
        }
    }

    fn error(&mut self, error: StreamError) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        self.observer.error(error);
        self.subscription.unsubscribe();
    }

    fn complete(&mut self) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        self.observer.complete();
        self.subscription.unsubscribe();
    }
}

// ============================================================================
// Observable
// ============================================================================

type Producer<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A cold stream: every subscription runs the producer afresh.
pub struct Observable<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Creates an observable from a producer function.
    ///
    /// Producers should stop emitting once `subscriber.is_closed()`.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Subscribes an observer; returns the subscription handle.
    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        self.subscribe_subscriber(Subscriber::new(observer))
    }

    /// Runs the producer against an existing subscriber.
    pub fn subscribe_subscriber(&self, subscriber: Subscriber<T>) -> Subscription {
        let subscription = subscriber.subscription().clone();
        (self.producer)(subscriber);
        subscription
    }

    /// Subscribes with a fresh subscription that closes when `parent` does.
    ///
    /// Operators use this so that a downstream unsubscribe (including the
    /// one triggered by a downstream completion) reaches the source while
    /// it is still producing.
    pub fn subscribe_linked(
        &self,
        observer: impl Observer<T> + 'static,
        parent: &Subscription,
    ) -> Subscription {
        let child = Subscription::new();
        parent.add_child(&child);
        self.subscribe_subscriber(Subscriber::with_subscription(observer, child))
    }
}

// ============================================================================
// Operators
// ============================================================================

type Transform<T> = dyn Fn(Observable<T>) -> Observable<T> + Send + Sync;

/// One pipeline stage: a named observable transformer.
pub struct Operator<T> {
    name: &'static str,
    transform: Arc<Transform<T>>,
}

impl<T> Clone for Operator<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<T> fmt::Debug for Operator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator").field("name", &self.name).finish()
    }
}

impl<T: Send + 'static> Operator<T> {
    pub fn new<F>(name: &'static str, transform: F) -> Self
    where
        F: Fn(Observable<T>) -> Observable<T> + Send + Sync + 'static,
    {
        Self {
            name,
            transform: Arc::new(transform),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, source: Observable<T>) -> Observable<T> {
        (self.transform)(source)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Emits each item in order, then completes.
pub fn from_iter<T, I>(items: I) -> Observable<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    let items: Arc<[T]> = items.into_iter().collect();
    Observable::new(move |mut subscriber: Subscriber<T>| {
        for item in items.iter() {
            if subscriber.is_closed() {
                return;
            }
            subscriber.next(item.clone());
        }
        subscriber.complete();
    })
}

/// Emits one value, then completes.
pub fn of<T>(value: T) -> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    from_iter([value])
}

/// Completes immediately.
pub fn empty<T: Send + 'static>() -> Observable<T> {
    Observable::new(|mut subscriber: Subscriber<T>| subscriber.complete())
}

/// Fails immediately with `error`.
pub fn throw_error<T: Send + 'static>(error: StreamError) -> Observable<T> {
    Observable::new(move |mut subscriber: Subscriber<T>| subscriber.error(error.clone()))
}
