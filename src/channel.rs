//! Channel handles and deferred channel streams.

use crate::error::Result;
use crate::message::Message;
use crate::registry::{RegistryInner, Route};
use crate::stream::{Observer, Source, Subscription, SubscriptionHandle};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

struct ChannelShared {
    name: String,
    route: Weak<dyn Route>,
    stream: MessageStream,
}

/// Handle to a named channel: publish into it, or subscribe to it.
///
/// Handles are cheap to clone. A handle stays valid after its channel is
/// disposed, but publishes are then routed by name to whatever channel of
/// that name exists at the time (or dropped).
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelShared>,
}

impl Channel {
    pub(crate) fn new(name: &str, route: Weak<dyn Route>, stream: MessageStream) -> Self {
        Self {
            inner: Arc::new(ChannelShared {
                name: name.to_string(),
                route,
                stream,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Publish a payload. Local subscribers have been called by the time
    /// this returns.
    pub fn publish(&self, data: impl Into<serde_json::Value>) -> Message {
        self.dispatch(None, data.into())
    }

    /// Publish a payload tagged with a message type.
    pub fn publish_typed(
        &self,
        data: impl Into<serde_json::Value>,
        message_type: impl Into<String>,
    ) -> Message {
        self.dispatch(Some(message_type.into()), data.into())
    }

    /// Serialize `data` and publish it.
    pub fn publish_serialized<T: Serialize>(&self, data: &T) -> Result<Message> {
        let value = serde_json::to_value(data)?;
        Ok(self.dispatch(None, value))
    }

    /// The channel's stream, resolved lazily on each subscribe.
    pub fn stream(&self) -> &MessageStream {
        &self.inner.stream
    }

    /// Whether both handles are the same handle instance.
    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn dispatch(
        &self,
        message_type: Option<String>,
        data: serde_json::Value,
    ) -> Message {
        let message = Message::stamp(&self.inner.name, message_type, data);
        match self.inner.route.upgrade() {
            Some(route) => route.route(message.clone()),
            None => trace!(channel = %self.inner.name, "broker dropped, message discarded"),
        }
        message
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("name", &self.inner.name).finish()
    }
}

/// A deferred stream of messages for one channel name.
///
/// Nothing is looked up when the stream is created. Every subscribe call
/// resolves the channel at that moment, creating it without a replay
/// cache if it does not exist yet, so a stream taken before the channel
/// was configured still attaches to the configured channel.
#[derive(Clone)]
pub struct MessageStream {
    channel_name: Arc<str>,
    registry: Weak<RegistryInner>,
}

impl MessageStream {
    pub(crate) fn new(channel_name: &str, registry: Weak<RegistryInner>) -> Self {
        Self {
            channel_name: Arc::from(channel_name),
            registry,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Attach a closure.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe_with(Arc::new(f))
    }

    /// Attach a queue-backed handle.
    pub fn subscribe_handle(&self) -> SubscriptionHandle<Message> {
        SubscriptionHandle::attach(self)
    }
}

impl Source<Message> for MessageStream {
    fn subscribe_with(&self, observer: Observer<Message>) -> Subscription {
        match self.registry.upgrade() {
            Some(registry) => registry.resolve(&self.channel_name).subscribe_with(observer),
            None => {
                trace!(channel = %self.channel_name, "broker dropped, subscription is inert");
                Subscription::empty()
            }
        }
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("channel", &self.channel_name)
            .finish()
    }
}
