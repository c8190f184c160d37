//! Channel registry: creates, upgrades, and disposes channels by name.

use crate::channel::{Channel, MessageStream};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::stream::{Replay, Source, Subject};
use crate::types::{BrokerConfig, ChannelConfig};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Surface shared by every broker flavour.
pub trait Broker {
    /// Get or create a channel. Supplying a config on an existing channel
    /// either upgrades it (first time) or must match the existing one.
    fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel>;

    /// Deferred stream for `name`; resolution happens on subscribe.
    fn get(&self, name: &str) -> MessageStream;

    /// Drop a channel and its replay cache. Returns false if unknown.
    fn dispose(&self, name: &str) -> bool;
}

/// Where channel handles send their messages, plus lifecycle hooks for
/// brokers that attach extra inputs to channels.
pub(crate) trait Route: Send + Sync {
    fn route(&self, message: Message);

    /// A channel was created, or re-created with a replay config.
    fn channel_ready(&self, _name: &str, _hub: &Subject<Message>) {}

    fn channel_disposed(&self, _name: &str) {}
}

/// Per-name channel state.
struct ChannelModel {
    /// Live broadcast for this channel.
    hub: Subject<Message>,
    /// What subscribers attach to: the hub, or the replay cache over it.
    source: Arc<dyn Source<Message>>,
    channel: Channel,
    config: Option<ChannelConfig>,
    /// Holds the keepalive observer while the channel is cached.
    replay: Option<Arc<Replay<Message>>>,
}

impl ChannelModel {
    fn build(registry: &Arc<RegistryInner>, name: &str, config: Option<ChannelConfig>) -> Self {
        let hub = Subject::with_delivery_lock(Arc::clone(&registry.delivery));
        let stream = MessageStream::new(name, Arc::downgrade(registry));
        let channel = Channel::new(name, registry.route.clone(), stream);

        let mut model = Self {
            source: Arc::new(hub.clone()),
            hub,
            channel,
            config: None,
            replay: None,
        };
        if let Some(config) = config {
            model.enable_replay(config);
        }
        model
    }

    /// Switch to cached delivery. Subscribers already on the hub keep
    /// receiving; only new subscribers see the replay.
    fn enable_replay(&mut self, config: ChannelConfig) {
        let replay = Arc::new(Replay::attach(&self.hub, config.replay_cache_size));
        self.source = Arc::clone(&replay) as Arc<dyn Source<Message>>;
        self.replay = Some(replay);
        self.config = Some(config);
    }
}

pub(crate) struct RegistryInner {
    name: String,
    models: Mutex<HashMap<String, ChannelModel>>,
    /// Shared by every channel hub so one publish is one critical section.
    delivery: Arc<ReentrantMutex<()>>,
    route: Weak<dyn Route>,
}

impl RegistryInner {
    fn create(
        self: &Arc<Self>,
        name: &str,
        config: Option<ChannelConfig>,
    ) -> Result<(Channel, Arc<dyn Source<Message>>)> {
        if let Some(config) = &config {
            config.validate(name)?;
        }

        let (channel, source, hub) = {
            let mut models = self.models.lock();
            match models.get_mut(name) {
                None => {
                    let model = ChannelModel::build(self, name, config);
                    debug!(
                        broker = %self.name,
                        channel = name,
                        replay = ?config.map(|c| c.replay_cache_size),
                        "channel created"
                    );
                    let created = (
                        model.channel.clone(),
                        Arc::clone(&model.source),
                        model.hub.clone(),
                    );
                    models.insert(name.to_string(), model);
                    created
                }
                Some(model) => match (config, model.config) {
                    (None, _) => {
                        return Ok((model.channel.clone(), Arc::clone(&model.source)));
                    }
                    (Some(requested), Some(existing)) if requested != existing => {
                        return Err(BrokerError::ConfigConflict {
                            channel: name.to_string(),
                            existing: existing.replay_cache_size,
                            requested: requested.replay_cache_size,
                        });
                    }
                    (Some(_), Some(_)) => (
                        model.channel.clone(),
                        Arc::clone(&model.source),
                        model.hub.clone(),
                    ),
                    (Some(requested), None) => {
                        model.enable_replay(requested);
                        debug!(
                            broker = %self.name,
                            channel = name,
                            replay = requested.replay_cache_size,
                            "channel upgraded to cached"
                        );
                        (
                            model.channel.clone(),
                            Arc::clone(&model.source),
                            model.hub.clone(),
                        )
                    }
                },
            }
        };

        if let Some(route) = self.route.upgrade() {
            route.channel_ready(name, &hub);
        }
        Ok((channel, source))
    }

    /// Look up (or implicitly create) what a new subscriber attaches to.
    pub(crate) fn resolve(self: &Arc<Self>, name: &str) -> Arc<dyn Source<Message>> {
        if let Some(model) = self.models.lock().get(name) {
            return Arc::clone(&model.source);
        }
        match self.create(name, None) {
            Ok((_, source)) => source,
            // Unreachable without a config, but keep subscribers inert rather than panic.
            Err(_) => Arc::new(Subject::<Message>::new()),
        }
    }

    fn deliver(&self, message: &Message) {
        let hub = self
            .models
            .lock()
            .get(&message.channel_name)
            .map(|model| model.hub.clone());

        match hub {
            Some(hub) => hub.next(message),
            None => trace!(
                broker = %self.name,
                channel = %message.channel_name,
                "no such channel, message dropped"
            ),
        }
    }
}

impl Route for RegistryInner {
    fn route(&self, message: Message) {
        self.deliver(&message);
    }
}

/// Maps channel names to channels.
///
/// Cloning yields another handle to the same registry.
///
/// ```ignore
/// let registry = ChannelRegistry::new();
/// let channel = registry.create("prices", Some(ChannelConfig::replay(1)))?;
/// channel.publish("one");
/// channel.publish("two");
///
/// let late = registry.get("prices").subscribe_handle();
/// assert_eq!(late.drain()[0].data, "two");
/// ```
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl ChannelRegistry {
    /// A standalone registry that delivers locally.
    pub fn new() -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let route: Weak<dyn Route> = weak.clone();
            RegistryInner {
                name: BrokerConfig::default().name,
                models: Mutex::new(HashMap::new()),
                delivery: Arc::new(ReentrantMutex::new(())),
                route,
            }
        });
        Self { inner }
    }

    /// A standalone registry with channels pre-created from `config`.
    pub fn with_config(config: BrokerConfig) -> Result<Self> {
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let route: Weak<dyn Route> = weak.clone();
            RegistryInner {
                name: config.name.clone(),
                models: Mutex::new(HashMap::new()),
                delivery: Arc::new(ReentrantMutex::new(())),
                route,
            }
        });
        let registry = Self { inner };
        registry.apply_config(&config)?;
        Ok(registry)
    }

    /// A registry whose channel handles publish through `route`.
    pub(crate) fn with_route(name: &str, route: Weak<dyn Route>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                name: name.to_string(),
                models: Mutex::new(HashMap::new()),
                delivery: Arc::new(ReentrantMutex::new(())),
                route,
            }),
        }
    }

    pub(crate) fn apply_config(&self, config: &BrokerConfig) -> Result<()> {
        for (name, channel) in &config.channels {
            self.create(name, Some(*channel))?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel> {
        self.inner.create(name, config).map(|(channel, _)| channel)
    }

    pub fn get(&self, name: &str) -> MessageStream {
        MessageStream::new(name, Arc::downgrade(&self.inner))
    }

    pub fn dispose(&self, name: &str) -> bool {
        let removed = self.inner.models.lock().remove(name);
        let Some(model) = removed else {
            return false;
        };
        // Tears down the replay keepalive, if any.
        drop(model);

        debug!(broker = %self.inner.name, channel = name, "channel disposed");
        if let Some(route) = self.inner.route.upgrade() {
            route.channel_disposed(name);
        }
        true
    }

    /// Dispose every channel. Returns how many were removed.
    pub(crate) fn dispose_all(&self) -> usize {
        self.channel_names()
            .iter()
            .filter(|name| self.dispose(name))
            .count()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.inner.models.lock().contains_key(name)
    }

    /// Names of all live channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.models.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn channel_config(&self, name: &str) -> Option<ChannelConfig> {
        self.inner.models.lock().get(name).and_then(|model| model.config)
    }

    /// Messages currently held in a channel's replay cache, oldest first.
    pub fn cached_messages(&self, name: &str) -> Vec<Message> {
        self.inner
            .models
            .lock()
            .get(name)
            .and_then(|model| model.replay.as_ref().map(|replay| replay.snapshot()))
            .unwrap_or_default()
    }

    /// Observers attached to a channel's live broadcast, replay keepalive
    /// included. Zero for unknown channels.
    pub fn observer_count(&self, name: &str) -> usize {
        self.inner
            .models
            .lock()
            .get(name)
            .map(|model| model.hub.observer_count())
            .unwrap_or(0)
    }

    /// Whether any channel has an observer on its live broadcast, replay
    /// keepalives included.
    pub fn has_observers(&self) -> bool {
        self.inner
            .models
            .lock()
            .values()
            .any(|model| model.hub.observer_count() > 0)
    }

    /// Live broadcast of a channel, if it exists.
    pub(crate) fn hub(&self, name: &str) -> Option<Subject<Message>> {
        self.inner
            .models
            .lock()
            .get(name)
            .map(|model| model.hub.clone())
    }

    /// Push an already-stamped message to local subscribers.
    pub(crate) fn deliver(&self, message: &Message) {
        self.inner.deliver(message);
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for ChannelRegistry {
    fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel> {
        ChannelRegistry::create(self, name, config)
    }

    fn get(&self, name: &str) -> MessageStream {
        ChannelRegistry::get(self, name)
    }

    fn dispose(&self, name: &str) -> bool {
        ChannelRegistry::dispose(self, name)
    }
}
