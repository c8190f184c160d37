//! Subscription guards and queue-backed handles.

use crossbeam_channel::{unbounded, Receiver};
use std::fmt;
use std::sync::Arc;

use super::subject::Source;

type Teardown = Box<dyn FnOnce() + Send + Sync>;

/// Keeps one observer attached. Dropping the guard (or calling
/// [`unsubscribe`](Subscription::unsubscribe)) detaches it.
#[must_use = "dropping a Subscription immediately detaches the observer"]
pub struct Subscription {
    teardown: Option<Teardown>,
}

impl Subscription {
    pub(crate) fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A subscription attached to nothing.
    pub fn empty() -> Self {
        Self { teardown: None }
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_none()
    }

    fn close(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle that queues deliveries for pull-style consumption.
///
/// Values are enqueued synchronously during delivery, so anything
/// published before a `publish` call returns is already readable.
pub struct SubscriptionHandle<T> {
    subscription: Subscription,
    /// Queue of delivered values.
    pub receiver: Receiver<T>,
}

impl<T: Clone + Send + 'static> SubscriptionHandle<T> {
    /// Attach a new queue to `source`.
    pub fn attach<S: Source<T> + ?Sized>(source: &S) -> Self {
        let (sender, receiver) = unbounded();
        let subscription = source.subscribe_with(Arc::new(move |value: &T| {
            // Receiver gone means the handle is being dropped.
            let _ = sender.send(value.clone());
        }));

        Self {
            subscription,
            receiver,
        }
    }
}

impl<T> SubscriptionHandle<T> {
    /// Receive the next value (blocking).
    pub fn recv(&self) -> Result<T, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a value (non-blocking).
    pub fn try_recv(&self) -> Result<T, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<T, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything queued so far.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Stop delivery. Values already queued are discarded.
    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}
