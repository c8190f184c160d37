//! Multicast subject with synchronous, ordered delivery.

use parking_lot::{ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::subscription::{Subscription, SubscriptionHandle};

/// Callback invoked for every delivered value.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Anything observers can be attached to.
pub trait Source<T>: Send + Sync {
    /// Attach an observer. Delivery stops when the returned guard is
    /// dropped or unsubscribed.
    fn subscribe_with(&self, observer: Observer<T>) -> Subscription;
}

impl<T, S: Source<T> + ?Sized> Source<T> for Arc<S> {
    fn subscribe_with(&self, observer: Observer<T>) -> Subscription {
        (**self).subscribe_with(observer)
    }
}

struct SubjectInner<T> {
    /// Observers in subscription order.
    observers: RwLock<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
    /// Serializes delivery. Reentrant so an observer may publish from
    /// inside its own callback.
    delivery: Arc<ReentrantMutex<()>>,
}

/// A hot stream: values pushed with [`next`](Subject::next) reach every
/// observer attached at that moment. Cloning yields another handle to the
/// same subject.
pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Subject<T> {
    pub fn new() -> Self {
        Self::with_delivery_lock(Arc::new(ReentrantMutex::new(())))
    }

    /// Create a subject that shares its delivery lock with others, so a
    /// group of subjects behaves as one serialized bus.
    pub(crate) fn with_delivery_lock(delivery: Arc<ReentrantMutex<()>>) -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                observers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                delivery,
            }),
        }
    }

    /// Deliver a value to all current observers, in subscription order,
    /// before returning.
    pub fn next(&self, value: &T) {
        let _delivery = self.inner.delivery.lock();
        let observers: Vec<Observer<T>> = self
            .inner
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(value);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Attach a closure as an observer.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(Arc::new(f))
    }

    /// Attach a queue-backed handle.
    pub fn subscribe_handle(&self) -> SubscriptionHandle<T>
    where
        T: Clone,
    {
        SubscriptionHandle::attach(self)
    }

    /// Register `observer` after running `prime` on it, both inside the
    /// delivery critical section: no value pushed concurrently can slip
    /// between the two steps.
    pub(crate) fn subscribe_primed<P>(&self, observer: Observer<T>, prime: P) -> Subscription
    where
        P: FnOnce(&Observer<T>),
    {
        let _delivery = self.inner.delivery.lock();
        prime(&observer);
        self.register(observer)
    }

    pub(crate) fn same_subject(&self, other: &Subject<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn register(&self, observer: Observer<T>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.observers.write().push((id, observer));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.write().retain(|(existing, _)| *existing != id);
            }
        })
    }
}

impl<T: Send + Sync + 'static> Source<T> for Subject<T> {
    fn subscribe_with(&self, observer: Observer<T>) -> Subscription {
        self.register(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_delivers_in_subscription_order() {
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let _a = subject.subscribe(move |v: &u32| first.lock().push(("a", *v)));
        let second = Arc::clone(&seen);
        let _b = subject.subscribe(move |v: &u32| second.lock().push(("b", *v)));

        subject.next(&1);
        subject.next(&2);

        assert_eq!(*seen.lock(), vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn test_no_delivery_before_subscribe() {
        let subject = Subject::new();
        subject.next(&1);

        let handle = subject.subscribe_handle();
        subject.next(&2);

        assert_eq!(handle.drain(), vec![2]);
    }

    #[test]
    fn test_unsubscribe_only_removes_one_observer() {
        let subject = Subject::new();
        let a = subject.subscribe_handle();
        let b = subject.subscribe_handle();
        assert_eq!(subject.observer_count(), 2);

        a.unsubscribe();
        assert_eq!(subject.observer_count(), 1);

        subject.next(&"x");
        assert_eq!(b.drain(), vec!["x"]);
    }

    #[test]
    fn test_dropping_guard_unsubscribes() {
        let subject: Subject<u8> = Subject::new();
        {
            let _sub = subject.subscribe(|_| {});
            assert_eq!(subject.observer_count(), 1);
        }
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_observer_may_publish_reentrantly() {
        let subject: Subject<u32> = Subject::new();
        let echo = subject.clone();
        let _sub = subject.subscribe(move |v| {
            if *v < 3 {
                echo.next(&(v + 1));
            }
        });
        let handle = subject.subscribe_handle();

        subject.next(&1);

        // Nested deliveries complete before the outer one continues.
        assert_eq!(handle.drain(), vec![3, 2, 1]);
    }

    #[test]
    fn test_primed_subscription_receives_prelude_first() {
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Observer<u32> = Arc::new(move |v| sink.lock().push(*v));

        let _sub = subject.subscribe_primed(observer, |observer| {
            observer(&10);
            observer(&11);
        });
        subject.next(&12);

        assert_eq!(*seen.lock(), vec![10, 11, 12]);
    }
}
