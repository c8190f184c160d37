//! The message envelope carried on every channel.

use crate::error::Result;
use crate::types::{MessageId, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An immutable envelope around a published payload.
///
/// `id` and `timestamp` are stamped by the registry at publish time. The
/// handled flag belongs to consumers and is shared between every clone of
/// the same envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub channel_name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
    pub id: MessageId,
    #[serde(skip)]
    handled: Arc<AtomicBool>,
}

impl Message {
    pub(crate) fn stamp(
        channel_name: &str,
        message_type: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            message_type,
            data,
            timestamp: Timestamp::now(),
            id: MessageId::new(),
            handled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a message received from an external transport.
    ///
    /// Adapters use this for inbound traffic; locally published messages
    /// are always built by the channel handle.
    pub fn inbound(
        channel_name: impl Into<String>,
        message_type: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        let channel_name = channel_name.into();
        Self::stamp(&channel_name, message_type, data)
    }

    /// Deserialize the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    pub fn mark_handled(&self) {
        self.handled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_assigns_identity() {
        let a = Message::stamp("chan", None, json!(1));
        let b = Message::stamp("chan", None, json!(1));

        assert_ne!(a.id, b.id);
        assert!(a.timestamp.0 > 0);
        assert!(!a.is_handled());
    }

    #[test]
    fn test_handled_flag_shared_between_clones() {
        let message = Message::stamp("chan", None, json!("x"));
        let copy = message.clone();

        copy.mark_handled();
        assert!(message.is_handled());
    }

    #[test]
    fn test_serialized_form() {
        let message = Message::stamp("chan", Some("greeting".into()), json!({"a": 1}));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["channel_name"], "chan");
        assert_eq!(value["type"], "greeting");
        assert_eq!(value["data"]["a"], 1);
        assert!(value.get("handled").is_none());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, message.id);
        assert!(!back.is_handled());
    }

    #[test]
    fn test_decode_payload() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Quote {
            symbol: String,
            price: u32,
        }

        let message = Message::stamp("chan", None, json!({"symbol": "ABC", "price": 7}));
        let quote: Quote = message.decode().unwrap();
        assert_eq!(
            quote,
            Quote {
                symbol: "ABC".into(),
                price: 7
            }
        );

        assert!(message.decode::<Vec<u8>>().is_err());
    }
}
