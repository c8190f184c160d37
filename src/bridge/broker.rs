//! Broker that mirrors its channels onto registered adapters.

use crate::channel::{Channel, MessageStream};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::registry::{Broker, ChannelRegistry, Route};
use crate::stream::{Source, Subject, Subscription};
use crate::types::{AdapterId, BrokerConfig, ChannelConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::adapter::{Adapter, AdapterError, AdapterOperation, ErrorStream};

struct BridgeInner {
    registry: ChannelRegistry,
    /// Drives adapter sends, which `publish` never waits on.
    runtime: Handle,
    adapters: RwLock<HashMap<AdapterId, Arc<dyn Adapter>>>,
    /// Each adapter's inbound stream, fetched once at registration.
    raw_streams: RwLock<HashMap<AdapterId, Arc<dyn Source<Message>>>>,
    /// channel -> adapter -> subscription feeding that adapter's inbound
    /// messages for the channel into the channel's hub.
    bridges: Mutex<HashMap<String, HashMap<AdapterId, Subscription>>>,
    errors: Subject<AdapterError>,
}

impl BridgeInner {
    fn report(&self, failure: AdapterError) {
        warn!(
            adapter_id = %failure.adapter_id,
            operation = %failure.operation,
            channel = ?failure.channel_name,
            error = %failure.error,
            "adapter failure"
        );
        self.errors.next(&failure);
    }

    /// Connect one adapter's inbound stream to one channel, unless that
    /// pair is already connected.
    fn attach(&self, channel: &str, adapter_id: AdapterId, hub: &Subject<Message>) {
        let already_bridged = self
            .bridges
            .lock()
            .get(channel)
            .map(|per_adapter| per_adapter.contains_key(&adapter_id))
            .unwrap_or(false);
        if already_bridged {
            return;
        }

        let raw = self.raw_streams.read().get(&adapter_id).cloned();
        let Some(raw) = raw else {
            return;
        };

        let target = hub.clone();
        let name = channel.to_string();
        // Subscribed outside the lock: the adapter may emit synchronously.
        let subscription = raw.subscribe_with(Arc::new(move |message: &Message| {
            if message.channel_name == name {
                target.next(message);
            }
        }));

        let mut bridges = self.bridges.lock();
        // The channel may have been disposed (and maybe recreated) while
        // subscribing, or the adapter unregistered. Only a bridge into the
        // current hub of a registered adapter is kept.
        let hub_is_current = self
            .registry
            .hub(channel)
            .map(|current| current.same_subject(hub))
            .unwrap_or(false);
        if !hub_is_current || !self.raw_streams.read().contains_key(&adapter_id) {
            drop(bridges);
            debug!(channel, adapter_id = %adapter_id, "stale bridge discarded");
            drop(subscription);
            return;
        }
        bridges
            .entry(channel.to_string())
            .or_default()
            .entry(adapter_id)
            .or_insert(subscription);
        drop(bridges);
        debug!(channel, adapter_id = %adapter_id, "adapter bridged to channel");
    }

    fn send_to_adapters(&self, message: &Message) {
        let adapters: Vec<(AdapterId, Arc<dyn Adapter>)> = self
            .adapters
            .read()
            .iter()
            .map(|(id, adapter)| (*id, Arc::clone(adapter)))
            .collect();

        for (adapter_id, adapter) in adapters {
            let message = message.clone();
            let errors = self.errors.clone();
            self.runtime.spawn(async move {
                if let Err(error) = adapter.send_message(message.clone()).await {
                    let failure = AdapterError::delivery(adapter_id, message, error);
                    warn!(
                        adapter_id = %adapter_id,
                        channel = ?failure.channel_name,
                        error = %failure.error,
                        "adapter send failed"
                    );
                    errors.next(&failure);
                }
            });
        }
    }
}

impl Route for BridgeInner {
    fn route(&self, message: Message) {
        self.registry.deliver(&message);
        self.send_to_adapters(&message);
    }

    fn channel_ready(&self, name: &str, hub: &Subject<Message>) {
        let adapter_ids: Vec<AdapterId> = self.adapters.read().keys().copied().collect();
        for adapter_id in adapter_ids {
            self.attach(name, adapter_id, hub);
        }
    }

    fn channel_disposed(&self, name: &str) {
        let removed = self.bridges.lock().remove(name);
        if let Some(bridges) = removed {
            debug!(channel = name, bridges = bridges.len(), "channel bridges released");
        }
    }
}

/// A broker whose channels are shared with external transports.
///
/// Local publishes reach local subscribers synchronously and are then
/// handed to every adapter concurrently on the tokio runtime. A failing
/// adapter never affects local delivery or the other adapters.
#[derive(Clone)]
pub struct AdapterBroker {
    inner: Arc<BridgeInner>,
}

impl AdapterBroker {
    /// Build a broker on the tokio runtime of the calling context.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self::build(&BrokerConfig::default().name, runtime)
    }

    /// Build a broker with channels pre-created from `config`.
    pub fn with_config(config: BrokerConfig, runtime: Handle) -> Result<Self> {
        let broker = Self::build(&config.name, runtime);
        broker.inner.registry.apply_config(&config)?;
        Ok(broker)
    }

    fn build(name: &str, runtime: Handle) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<BridgeInner>| {
            let route: Weak<dyn Route> = weak.clone();
            BridgeInner {
                registry: ChannelRegistry::with_route(name, route),
                runtime,
                adapters: RwLock::new(HashMap::new()),
                raw_streams: RwLock::new(HashMap::new()),
                bridges: Mutex::new(HashMap::new()),
                errors: Subject::new(),
            }
        });
        Self { inner }
    }

    /// Register an adapter and connect it.
    ///
    /// A failed connect is reported on the error stream; the adapter stays
    /// registered either way. Existing channels start receiving the
    /// adapter's inbound messages.
    pub async fn register_adapter(&self, adapter: Arc<dyn Adapter>) -> AdapterId {
        let adapter_id = AdapterId::new();
        self.inner
            .adapters
            .write()
            .insert(adapter_id, Arc::clone(&adapter));
        debug!(adapter_id = %adapter_id, "adapter registered");

        if let Err(error) = adapter.connect().await {
            self.inner.report(AdapterError::lifecycle(
                adapter_id,
                AdapterOperation::Connect,
                error,
            ));
        }

        if !self.inner.adapters.read().contains_key(&adapter_id) {
            // Unregistered while connecting.
            return adapter_id;
        }
        let raw = adapter.message_stream();
        self.inner.raw_streams.write().insert(adapter_id, raw);

        for name in self.inner.registry.channel_names() {
            if let Some(hub) = self.inner.registry.hub(&name) {
                self.inner.attach(&name, adapter_id, &hub);
            }
        }
        adapter_id
    }

    /// Disconnect an adapter and drop every trace of it.
    ///
    /// A failed disconnect is reported on the error stream; the adapter is
    /// removed either way. Returns false for unknown ids.
    pub async fn unregister_adapter(&self, adapter_id: AdapterId) -> bool {
        let adapter = self.inner.adapters.read().get(&adapter_id).cloned();
        let Some(adapter) = adapter else {
            debug!(adapter_id = %adapter_id, "unregister of unknown adapter ignored");
            return false;
        };

        if let Err(error) = adapter.disconnect().await {
            self.inner.report(AdapterError::lifecycle(
                adapter_id,
                AdapterOperation::Disconnect,
                error,
            ));
        }

        let released: Vec<Subscription> = {
            let mut bridges = self.inner.bridges.lock();
            let released = bridges
                .values_mut()
                .filter_map(|per_adapter| per_adapter.remove(&adapter_id))
                .collect();
            bridges.retain(|_, per_adapter| !per_adapter.is_empty());
            released
        };
        drop(released);

        self.inner.raw_streams.write().remove(&adapter_id);
        self.inner.adapters.write().remove(&adapter_id);
        debug!(adapter_id = %adapter_id, "adapter unregistered");
        true
    }

    /// Snapshot of the registered adapters.
    pub fn adapters(&self) -> HashMap<AdapterId, Arc<dyn Adapter>> {
        self.inner.adapters.read().clone()
    }

    pub fn error_stream(&self) -> ErrorStream {
        ErrorStream::new(self.inner.errors.clone())
    }

    /// How many adapters currently feed the channel `name`.
    pub fn bridged_adapters(&self, name: &str) -> usize {
        self.inner
            .bridges
            .lock()
            .get(name)
            .map(|per_adapter| per_adapter.len())
            .unwrap_or(0)
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
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
}

impl Broker for AdapterBroker {
    fn create(&self, name: &str, config: Option<ChannelConfig>) -> Result<Channel> {
        AdapterBroker::create(self, name, config)
    }

    fn get(&self, name: &str) -> MessageStream {
        AdapterBroker::get(self, name)
    }

    fn dispose(&self, name: &str) -> bool {
        AdapterBroker::dispose(self, name)
    }
}
