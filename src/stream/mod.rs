//! Push-based stream primitives the broker is built from.
//!
//! - [`Subject`]: hot multicast stream, delivers synchronously in
//!   subscription order
//! - [`Replay`]: bounded history attached to a subject by a keepalive
//!   observer, replayed to each new subscriber before live values
//! - [`Subscription`]: RAII guard removing one observer
//! - [`SubscriptionHandle`]: queue-backed consumer for pull-style reading
//!
//! # Example
//!
//! ```ignore
//! let subject = Subject::new();
//! let replay = Replay::attach(&subject, 2);
//!
//! subject.next(&1);
//! subject.next(&2);
//! subject.next(&3);
//!
//! let handle = SubscriptionHandle::attach(&replay);
//! assert_eq!(handle.drain(), vec![2, 3]);
//! ```

mod replay;
mod subject;
mod subscription;

pub use replay::Replay;
pub use subject::{Observer, Source, Subject};
pub use subscription::{Subscription, SubscriptionHandle};
