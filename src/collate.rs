//! Request/response fan-out: ask every responder on a channel and gather
//! their answers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Identifies one registered responder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResponderId(pub u64);

impl fmt::Display for ResponderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Responder<Req, Resp> = Arc<dyn Fn(&Req) -> Resp + Send + Sync>;

/// Registry of responders keyed by channel name.
pub struct Collator<Req, Resp> {
    /// Responders per channel, in registration order.
    responders: RwLock<HashMap<String, Vec<(ResponderId, Responder<Req, Resp>)>>>,
    next_id: AtomicU64,
}

impl<Req, Resp> Collator<Req, Resp> {
    pub fn new() -> Self {
        Self {
            responders: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a responder for `channel`.
    pub fn respond<F>(&self, channel: &str, handler: F) -> ResponderId
    where
        F: Fn(&Req) -> Resp + Send + Sync + 'static,
    {
        let id = ResponderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.responders
            .write()
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a responder. Returns false if it was not registered.
    pub fn remove(&self, id: ResponderId) -> bool {
        let mut responders = self.responders.write();
        let mut found = false;
        responders.retain(|_, list| {
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            found |= list.len() != before;
            !list.is_empty()
        });
        found
    }

    /// Invoke every responder on `channel` in registration order and
    /// collect the results. Empty when nobody responds.
    pub fn collate(&self, channel: &str, request: &Req) -> Vec<Resp> {
        let handlers: Vec<Responder<Req, Resp>> = self
            .responders
            .read()
            .get(channel)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(channel, responders = handlers.len(), "collating");
        handlers.iter().map(|handler| handler(request)).collect()
    }

    pub fn responder_count(&self, channel: &str) -> usize {
        self.responders
            .read()
            .get(channel)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl<Req, Resp> Default for Collator<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_registration_order() {
        let collator: Collator<u32, u32> = Collator::new();
        collator.respond("math", |n| n + 1);
        collator.respond("math", |n| n * 10);
        collator.respond("other", |_| 0);

        assert_eq!(collator.collate("math", &4), vec![5, 40]);
    }

    #[test]
    fn test_no_responders() {
        let collator: Collator<(), String> = Collator::new();
        assert!(collator.collate("nobody", &()).is_empty());
    }

    #[test]
    fn test_remove_by_identity() {
        let collator: Collator<u32, &'static str> = Collator::new();
        let first = collator.respond("chan", |_| "first");
        collator.respond("chan", |_| "second");

        assert!(collator.remove(first));
        assert!(!collator.remove(first));
        assert_eq!(collator.collate("chan", &0), vec!["second"]);
        assert_eq!(collator.responder_count("chan"), 1);
    }

    #[test]
    fn test_responder_may_register_another() {
        let collator: Arc<Collator<u32, u32>> = Arc::new(Collator::new());
        let inner = Arc::clone(&collator);
        collator.respond("chan", move |n| {
            inner.respond("chan", |n| n * 2);
            *n
        });

        assert_eq!(collator.collate("chan", &3), vec![3]);
        assert_eq!(collator.responder_count("chan"), 2);
    }
}
