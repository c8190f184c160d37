//! Bridging the local bus to external transports.
//!
//! An [`Adapter`] connects the broker to something outside the process (a
//! network broker, a queue, a socket). The [`AdapterBroker`]:
//! - forwards every local publish to every registered adapter
//! - feeds each adapter's inbound messages into the matching local channel
//! - reports connect, disconnect, and send failures on an error stream
//!   instead of returning them
//!
//! # Example
//!
//! ```ignore
//! let broker = AdapterBroker::new()?;
//! let errors = broker.error_stream().subscribe_handle();
//!
//! let id = broker.register_adapter(Arc::new(MyTransport::new())).await;
//! broker.create("orders", None)?.publish(json!({"id": 1}));
//!
//! for failure in errors.drain() {
//!     eprintln!("{failure}");
//! }
//! broker.unregister_adapter(id).await;
//! ```

mod adapter;
mod broker;

pub use adapter::{Adapter, AdapterError, AdapterOperation, AdapterResult, BoxError, ErrorStream};
pub use broker::AdapterBroker;
