//! Adapter contract and the error records adapters produce.

use crate::message::Message;
use crate::stream::{Observer, Source, Subject, Subscription, SubscriptionHandle};
use crate::types::{AdapterId, Timestamp};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Error type adapters return.
pub type BoxError = Box<dyn Error + Send + Sync>;

pub type AdapterResult = std::result::Result<(), BoxError>;

/// An external transport plugged into an [`AdapterBroker`](super::AdapterBroker).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Establish the transport connection.
    async fn connect(&self) -> AdapterResult;

    /// Tear the connection down.
    async fn disconnect(&self) -> AdapterResult;

    /// Deliver one outbound message.
    async fn send_message(&self, message: Message) -> AdapterResult;

    /// Multicast stream of messages received from outside. Each message's
    /// `channel_name` decides which local channel it reaches.
    ///
    /// Called once per registration.
    fn message_stream(&self) -> Arc<dyn Source<Message>>;
}

/// Which adapter operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterOperation {
    Connect,
    Disconnect,
    Send,
}

impl fmt::Display for AdapterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterOperation::Connect => write!(f, "connect"),
            AdapterOperation::Disconnect => write!(f, "disconnect"),
            AdapterOperation::Send => write!(f, "send"),
        }
    }
}

/// A failure reported on the broker's error stream.
///
/// `channel_name` and `message` are only set for send failures.
#[derive(Clone, Debug)]
pub struct AdapterError {
    pub adapter_id: AdapterId,
    pub operation: AdapterOperation,
    pub channel_name: Option<String>,
    pub message: Option<Message>,
    pub error: Arc<dyn Error + Send + Sync>,
    pub timestamp: Timestamp,
}

impl AdapterError {
    pub(crate) fn lifecycle(
        adapter_id: AdapterId,
        operation: AdapterOperation,
        error: BoxError,
    ) -> Self {
        Self {
            adapter_id,
            operation,
            channel_name: None,
            message: None,
            error: Arc::from(error),
            timestamp: Timestamp::now(),
        }
    }

    pub(crate) fn delivery(adapter_id: AdapterId, message: Message, error: BoxError) -> Self {
        Self {
            adapter_id,
            operation: AdapterOperation::Send,
            channel_name: Some(message.channel_name.clone()),
            message: Some(message),
            error: Arc::from(error),
            timestamp: Timestamp::now(),
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel_name {
            Some(channel) => write!(
                f,
                "adapter {} failed to {} on '{}': {}",
                self.adapter_id, self.operation, channel, self.error
            ),
            None => write!(
                f,
                "adapter {} failed to {}: {}",
                self.adapter_id, self.operation, self.error
            ),
        }
    }
}

/// Broadcast stream of adapter failures.
///
/// Every observer sees every failure. Nothing is buffered: failures
/// reported while nobody listens are gone.
#[derive(Clone)]
pub struct ErrorStream {
    subject: Subject<AdapterError>,
}

impl ErrorStream {
    pub(crate) fn new(subject: Subject<AdapterError>) -> Self {
        Self { subject }
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&AdapterError) + Send + Sync + 'static,
    {
        self.subject.subscribe(f)
    }

    pub fn subscribe_handle(&self) -> SubscriptionHandle<AdapterError> {
        self.subject.subscribe_handle()
    }

    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }
}

impl Source<AdapterError> for ErrorStream {
    fn subscribe_with(&self, observer: Observer<AdapterError>) -> Subscription {
        self.subject.subscribe_with(observer)
    }
}
