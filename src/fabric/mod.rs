//! Signal/slot dispatch fabric: the deferred-invocation queue, subscriber
//! identity anchors, and typed multicast signals.

mod anchor;
mod signal;

pub(crate) mod queue;

pub(crate) use self::queue::Deferred;
pub(crate) use self::queue::DispatchQueue;
pub(crate) use self::queue::guarded;

pub use self::anchor::Anchor;
pub use self::signal::Signal;
