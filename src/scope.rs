//! Hierarchical brokers: publishes nobody handles locally bubble upward.

use crate::channel::{Channel, MessageStream};
use crate::error::Result;
use crate::message::Message;
use crate::registry::{Broker, ChannelRegistry, Route};
use crate::types::{BrokerConfig, ChannelConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

struct ScopeInner {
    name: String,
    registry: ChannelRegistry,
    /// Cleared on destroy. Weak so children never keep a parent alive.
    parent: RwLock<Weak<ScopeInner>>,
    /// Child scopes by name. At most one child per name.
    children: Mutex<BTreeMap<String, ScopedBroker>>,
    destroyed: AtomicBool,
}

impl Route for ScopeInner {
    fn route(&self, message: Message) {
        // Nearest handler wins: any observer in this scope, on any channel,
        // shadows the parent.
        if !self.registry.has_observers() {
            let parent = self.parent.read().upgrade();
            if let Some(parent) = parent {
                debug!(
                    scope = %self.name,
                    parent = %parent.name,
                    channel = %message.channel_name,
                    "no local observers, bubbling to parent"
                );
                let Message {
                    channel_name,
                    message_type,
                    data,
                    ..
                } = message;
                if let Ok(channel) = parent.registry.create(&channel_name, None) {
                    channel.dispatch(message_type, data);
                }
                return;
            }
        }
        self.registry.deliver(&message);
    }
}

/// A broker that forms a tree with other scoped brokers.
///
/// Publishing in a scope that has no observers at all republishes the
/// payload on the parent's channel of the same name, recursively up to
/// the root. A scope with any observer, on any of its channels, handles
/// the message alone. Replay caches count as observers.
///
/// Parents own their children; children only hold a weak link upward.
#[derive(Clone)]
pub struct ScopedBroker {
    inner: Arc<ScopeInner>,
}

impl ScopedBroker {
    /// Create a root scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(&name.into(), Weak::new())
    }

    /// Create a root scope with channels pre-created from `config`.
    pub fn with_config(config: BrokerConfig) -> Result<Self> {
        let scope = Self::build(&config.name, Weak::new());
        scope.inner.registry.apply_config(&config)?;
        Ok(scope)
    }

    fn build(name: &str, parent: Weak<ScopeInner>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ScopeInner>| {
            let route: Weak<dyn Route> = weak.clone();
            ScopeInner {
                name: name.to_string(),
                registry: ChannelRegistry::with_route(name, route),
                parent: RwLock::new(parent),
                children: Mutex::new(BTreeMap::new()),
                destroyed: AtomicBool::new(false),
            }
        });
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get or create the child scope called `name`.
    pub fn create_scope(&self, name: &str) -> ScopedBroker {
        let mut children = self.inner.children.lock();
        children
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(scope = %self.inner.name, child = name, "scope created");
                Self::build(name, Arc::downgrade(&self.inner))
            })
            .clone()
    }

    pub fn parent(&self) -> Option<ScopedBroker> {
        self.inner
            .parent
            .read()
            .upgrade()
            .map(|inner| ScopedBroker { inner })
    }

    /// Names of live child scopes, sorted.
    pub fn children(&self) -> Vec<String> {
        self.inner.children.lock().keys().cloned().collect()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &ScopedBroker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel> {
        self.inner.registry.create(name, config)
    }

    pub fn get(&self, name: &str) -> MessageStream {
        self.inner.registry.get(name)
    }

    pub fn dispose(&self, name: &str) -> bool {
        self.inner.registry.dispose(name)
    }

    /// Dispose every channel in this scope and cut it out of the tree.
    ///
    /// The scope stops bubbling, its parent forgets it (so the name can be
    /// reused), and its children become roots. Children keep their own
    /// channels and caches.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let disposed = self.inner.registry.dispose_all();

        let parent = std::mem::take(&mut *self.inner.parent.write());
        if let Some(parent) = parent.upgrade() {
            let mut siblings = parent.children.lock();
            let is_registered = siblings
                .get(&self.inner.name)
                .map(|child| child.ptr_eq(self))
                .unwrap_or(false);
            if is_registered {
                siblings.remove(&self.inner.name);
            }
        }

        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children.values() {
            *child.inner.parent.write() = Weak::new();
        }

        debug!(
            scope = %self.inner.name,
            channels = disposed,
            orphaned = children.len(),
            "scope destroyed"
        );
    }
}

impl Broker for ScopedBroker {
    fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel> {
        ScopedBroker::create(self, name, config)
    }

    fn get(&self, name: &str) -> MessageStream {
        ScopedBroker::get(self, name)
    }

    fn dispose(&self, name: &str) -> bool {
        ScopedBroker::dispose(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unhandled_publish_bubbles_to_parent() {
        let root = ScopedBroker::new("root");
        let child = root.create_scope("child");
        let parent_handle = root.get("events").subscribe_handle();

        let channel = child.create("events", None).unwrap();
        channel.publish_typed("ping", "probe");

        let received = parent_handle.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].data, json!("ping"));
        assert_eq!(received[0].message_type.as_deref(), Some("probe"));
    }

    #[test]
    fn test_local_observer_shadows_parent() {
        let root = ScopedBroker::new("root");
        let child = root.create_scope("child");
        let parent_handle = root.get("events").subscribe_handle();
        let child_handle = child.get("events").subscribe_handle();

        child.create("events", None).unwrap().publish(1);

        assert_eq!(child_handle.drain().len(), 1);
        assert!(parent_handle.drain().is_empty());
    }

    #[test]
    fn test_listener_on_any_channel_shadows_parent() {
        let root = ScopedBroker::new("root");
        let child = root.create_scope("child");
        let other = child.get("other").subscribe_handle();
        let parent_handle = root.get("events").subscribe_handle();

        child.create("events", None).unwrap().publish(1);
        assert!(parent_handle.drain().is_empty());

        // Once the child has no listeners at all, publishes bubble again.
        other.unsubscribe();
        child.create("events", None).unwrap().publish(2);
        assert_eq!(parent_handle.drain()[0].data, json!(2));
    }

    #[test]
    fn test_bubbles_through_several_levels() {
        let root = ScopedBroker::new("root");
        let leaf = root.create_scope("mid").create_scope("leaf");
        let root_handle = root.get("events").subscribe_handle();

        leaf.create("events", None).unwrap().publish("deep");

        assert_eq!(root_handle.drain()[0].data, json!("deep"));
    }

    #[test]
    fn test_cached_child_channel_does_not_bubble() {
        let root = ScopedBroker::new("root");
        let child = root.create_scope("child");
        let parent_handle = root.get("events").subscribe_handle();

        let channel = child
            .create("events", Some(ChannelConfig::replay(1)))
            .unwrap();
        channel.publish("kept");

        assert!(parent_handle.drain().is_empty());
        let late = child.get("events").subscribe_handle();
        assert_eq!(late.drain()[0].data, json!("kept"));
    }

    #[test]
    fn test_create_scope_deduplicates_by_name() {
        let root = ScopedBroker::new("root");
        let a = root.create_scope("child");
        let b = root.create_scope("child");
        let c = root.create_scope("other");

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(root.children(), vec!["child".to_string(), "other".to_string()]);
        assert!(a.parent().unwrap().ptr_eq(&root));
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_destroy_severs_parent_link() {
        let root = ScopedBroker::new("root");
        let child = root.create_scope("child");
        let parent_handle = root.get("events").subscribe_handle();
        let channel = child.create("events", None).unwrap();

        child.destroy();

        assert!(child.is_destroyed());
        assert!(child.parent().is_none());
        assert!(child.registry().channel_names().is_empty());
        assert!(root.children().is_empty());

        channel.publish("after destroy");
        assert!(parent_handle.drain().is_empty());

        let fresh = root.create_scope("child");
        assert!(!fresh.ptr_eq(&child));
    }

    #[test]
    fn test_destroying_parent_orphans_children() {
        let root = ScopedBroker::new("root");
        let mid = root.create_scope("mid");
        let leaf = mid.create_scope("leaf");
        let cached = leaf.create("events", Some(ChannelConfig::replay(2))).unwrap();
        cached.publish(1);

        mid.destroy();

        assert!(leaf.parent().is_none());
        assert!(!leaf.is_destroyed());
        let handle = leaf.get("events").subscribe_handle();
        assert_eq!(handle.drain()[0].data, json!(1));
    }

    #[test]
    fn test_root_without_observers_drops_message() {
        let root = ScopedBroker::new("root");
        let channel = root.create("events", None).unwrap();
        channel.publish("nobody");

        let handle = root.get("events").subscribe_handle();
        assert!(handle.drain().is_empty());
    }
}
