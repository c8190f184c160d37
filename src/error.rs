//! Error types for the channel broker.

use thiserror::Error;

/// Main error type for broker operations.
///
/// Only configuration problems are raised to callers. Adapter failures are
/// never returned from broker methods; they surface on the error stream
/// as [`AdapterError`](crate::bridge::AdapterError) records.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Channel '{channel}' already exists with replay cache size {existing}, requested {requested}")]
    ConfigConflict {
        channel: String,
        existing: usize,
        requested: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to drive adapter I/O")]
    NoRuntime,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Serialization(e.to_string())
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
