//! Bounded replay cache kept warm by a keepalive observer.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::subject::{Observer, Source, Subject};
use super::subscription::Subscription;

/// The last `capacity` values pushed through a [`Subject`], replayed to
/// every new subscriber ahead of live values.
///
/// The keepalive observer is attached for as long as the `Replay` lives,
/// so history accumulates even with zero external subscribers.
pub struct Replay<T> {
    source: Subject<T>,
    buffer: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    _keepalive: Subscription,
}

impl<T: Clone + Send + Sync + 'static> Replay<T> {
    /// Start caching values from `source`.
    pub fn attach(source: &Subject<T>, capacity: usize) -> Self {
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let sink = Arc::clone(&buffer);

        let keepalive = source.subscribe(move |value: &T| {
            if capacity == 0 {
                return;
            }
            let mut buffer = sink.lock();
            if buffer.len() == capacity {
                buffer.pop_front();
            }
            buffer.push_back(value.clone());
        });

        Self {
            source: source.clone(),
            buffer,
            capacity,
            _keepalive: keepalive,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values currently cached.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached values, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.buffer.lock().iter().cloned().collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Source<T> for Replay<T> {
    fn subscribe_with(&self, observer: Observer<T>) -> Subscription {
        let buffer = Arc::clone(&self.buffer);
        self.source.subscribe_primed(observer, move |observer| {
            // Copy out first: the observer may publish and re-enter the keepalive.
            let cached: Vec<T> = buffer.lock().iter().cloned().collect();
            for value in &cached {
                observer(value);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SubscriptionHandle;

    #[test]
    fn test_replays_last_n() {
        let subject = Subject::new();
        let replay = Replay::attach(&subject, 2);

        for i in 1..=5 {
            subject.next(&i);
        }

        let handle = SubscriptionHandle::attach(&replay);
        assert_eq!(handle.drain(), vec![4, 5]);

        subject.next(&6);
        assert_eq!(handle.drain(), vec![6]);
    }

    #[test]
    fn test_keepalive_counts_as_observer() {
        let subject: Subject<u8> = Subject::new();
        let replay = Replay::attach(&subject, 1);
        assert_eq!(subject.observer_count(), 1);

        drop(replay);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_unsubscribing_keeps_cache_warm() {
        let subject = Subject::new();
        let replay = Replay::attach(&subject, 3);

        let handle = SubscriptionHandle::attach(&replay);
        handle.unsubscribe();

        subject.next(&"a");
        assert_eq!(replay.snapshot(), vec!["a"]);
    }

    #[test]
    fn test_partial_buffer() {
        let subject = Subject::new();
        let replay = Replay::attach(&subject, 10);
        subject.next(&1);

        assert_eq!(replay.len(), 1);
        assert_eq!(replay.capacity(), 10);
        let handle = SubscriptionHandle::attach(&replay);
        assert_eq!(handle.drain(), vec![1]);
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let subject = Subject::new();
        let replay = Replay::attach(&subject, 0);
        subject.next(&1);

        assert!(replay.is_empty());
    }
}
