//! # Channel Bus
//!
//! An in-process publish/subscribe router built around named channels.
//!
//! ## Core Concepts
//!
//! - **Channels**: named streams of [`Message`]s, created lazily by name
//! - **Replay caches**: a channel may keep its last N messages and replay
//!   them to every new subscriber
//! - **Deferred streams**: [`MessageStream`]s resolve their channel on
//!   subscribe, so subscribing before the channel is configured is safe
//! - **Scopes**: [`ScopedBroker`] trees where unhandled publishes bubble up
//! - **Adapters**: [`AdapterBroker`] mirrors channels onto external
//!   transports and reports their failures on an error stream
//! - **Collate**: [`Collator`] gathers answers from every responder on a
//!   channel
//!
//! ## Example
//!
//! ```ignore
//! use channelbus::{ChannelConfig, ChannelRegistry};
//!
//! let registry = ChannelRegistry::new();
//!
//! // Subscribing first is fine: the stream resolves on subscribe.
//! let updates = registry.get("prices").subscribe_handle();
//!
//! let prices = registry.create("prices", Some(ChannelConfig::replay(10)))?;
//! prices.publish(json!({"symbol": "ABC", "price": 42}));
//!
//! let message = updates.recv()?;
//! assert_eq!(message.data["price"], 42);
//! ```

pub mod bridge;
pub mod channel;
pub mod collate;
pub mod error;
pub mod message;
pub mod registry;
pub mod scope;
pub mod stream;
pub mod types;

// Re-exports
pub use bridge::{
    Adapter, AdapterBroker, AdapterError, AdapterOperation, AdapterResult, BoxError, ErrorStream,
};
pub use channel::{Channel, MessageStream};
pub use collate::{Collator, ResponderId};
pub use error::{BrokerError, Result};
pub use message::Message;
pub use registry::{Broker, ChannelRegistry};
pub use scope::ScopedBroker;
pub use stream::{Observer, Replay, Source, Subject, Subscription, SubscriptionHandle};
pub use types::*;
