//! Core types for the channel broker.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for a message (assigned by the registry on publish).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier generated for each registered adapter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdapterId(pub Uuid);

impl AdapterId {
    pub fn new() -> Self {
        AdapterId(Uuid::new_v4())
    }
}

impl Default for AdapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterId({})", self.0)
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Per-channel configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Number of most recent messages replayed to every new subscriber.
    pub replay_cache_size: usize,
}

impl ChannelConfig {
    pub fn replay(replay_cache_size: usize) -> Self {
        Self { replay_cache_size }
    }

    pub(crate) fn validate(&self, channel: &str) -> Result<()> {
        if self.replay_cache_size == 0 {
            return Err(BrokerError::InvalidConfig(format!(
                "channel '{}' requested a replay cache of size 0",
                channel
            )));
        }
        Ok(())
    }
}

/// Broker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Label used in logs (and as the scope name for scoped brokers).
    pub name: String,

    /// Channels created eagerly when the broker is built.
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "root".to_string(),
            channels: BTreeMap::new(),
        }
    }
}

impl BrokerConfig {
    /// Parse a configuration from JSON.
    ///
    /// ```ignore
    /// let config = BrokerConfig::from_json(r#"{
    ///     "name": "app",
    ///     "channels": { "prices": { "replay_cache_size": 5 } }
    /// }"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BrokerConfig = serde_json::from_str(json)?;
        for (name, channel) in &config.channels {
            channel.validate(name)?;
        }
        Ok(config)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
