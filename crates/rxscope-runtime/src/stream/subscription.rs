//! Teardown handles for running streams.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Teardown = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
}

/// Shared handle to a running subscription.
///
/// Cloning yields another handle to the same subscription. Unsubscribing
/// runs every registered teardown exactly once, in registration order;
/// teardowns added after that run immediately.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Registers a teardown to run on unsubscribe.
    pub fn add<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut teardowns = self
            .inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.is_closed() {
            drop(teardowns);
            teardown();
        } else {
            teardowns.push(Box::new(teardown));
        }
    }

    /// Makes `child` unsubscribe whenever this subscription does.
    pub fn add_child(&self, child: &Subscription) {
        let child = child.clone();
        self.add(move || child.unsubscribe());
    }

    /// Closes the subscription and runs its teardowns.
    ///
    /// Teardowns run outside the internal lock, so they may freely touch
    /// other subscriptions (or this one).
    pub fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let teardowns = std::mem::take(
            &mut *self
                .inner
                .teardowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for teardown in teardowns {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
