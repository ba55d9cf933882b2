use parking_lot::Mutex;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;
use triomphe::Arc as TArc;

use crate::app::Runtime;
use crate::core::ObjectId;
use crate::fabric::Anchor;
use crate::fabric::queue::Deferred;
use crate::fabric::queue::guarded;

// -----------------------------------------------------------------------------
// Subscription
// -----------------------------------------------------------------------------

struct Subscription<A> {
  owner: Option<ObjectId>,
  call: Arc<dyn Fn(&Runtime, A) + Send + Sync>,
}

impl<A> Clone for Subscription<A> {
  fn clone(&self) -> Self {
    Self {
      owner: self.owner,
      call: Arc::clone(&self.call),
    }
  }
}

// -----------------------------------------------------------------------------
// Signal
// -----------------------------------------------------------------------------

struct SignalInner<A> {
  subs: Mutex<Vec<Subscription<A>>>,
}

/// A typed multicast publisher.
///
/// Subscribers are visited in insertion order. Emitting never runs a
/// subscriber directly: each subscription becomes a deferred invocation on
/// the runtime's dispatch queue, where the owner identity is re-checked
/// just before the call so destroyed subscribers are skipped.
///
/// Signals are cheap to clone; clones share the subscription list.
pub struct Signal<A> {
  inner: TArc<SignalInner<A>>,
}

impl<A> Signal<A> {
  /// Creates a signal with no subscribers.
  pub fn new() -> Self {
    Self {
      inner: TArc::new(SignalInner {
        subs: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Subscribes `call` under the identity of `anchor`.
  ///
  /// Deliveries enqueued before the anchor is dropped but drained after it
  /// execute as no-ops.
  pub fn connect<F>(&self, anchor: &Anchor, call: F)
  where
    F: Fn(&Runtime, A) + Send + Sync + 'static,
  {
    let mut subs = self.inner.subs.lock();

    subs.push(Subscription {
      owner: Some(anchor.id()),
      call: Arc::new(call),
    });

    tracing::trace!(owner = %anchor.id(), total = subs.len(), "signal connected");
  }

  /// Subscribes a free function with no owner; it is never skipped.
  pub fn connect_fn<F>(&self, call: F)
  where
    F: Fn(&Runtime, A) + Send + Sync + 'static,
  {
    let mut subs = self.inner.subs.lock();

    subs.push(Subscription {
      owner: None,
      call: Arc::new(call),
    });

    tracing::trace!(total = subs.len(), "signal connected");
  }

  /// Drops every subscription owned by `anchor`.
  pub fn disconnect_of(&self, anchor: &Anchor) {
    let owner: ObjectId = anchor.id();
    self.inner.subs.lock().retain(|sub| sub.owner != Some(owner));
  }

  /// Drops every subscription.
  pub fn clear(&self) {
    self.inner.subs.lock().clear();
  }

  /// Returns the number of subscriptions.
  pub fn len(&self) -> usize {
    self.inner.subs.lock().len()
  }

  /// Returns `true` if nothing is subscribed.
  pub fn is_empty(&self) -> bool {
    self.inner.subs.lock().is_empty()
  }
}

impl<A> Signal<A>
where
  A: Clone + Send + 'static,
{
  /// Publishes `args` to every subscriber.
  ///
  /// One deferred invocation per subscription is pushed to the dispatch
  /// queue in insertion order, inside a single queue critical section, so
  /// concurrent emits interleave at whole-signal granularity. Arguments are
  /// cloned per subscriber.
  ///
  /// Returns `false` when the signal had no subscribers.
  pub fn emit(&self, runtime: &Runtime, args: A) -> bool {
    let batch: Vec<Deferred> = {
      let subs = self.inner.subs.lock();

      if subs.is_empty() {
        return false;
      }

      subs
        .iter()
        .cloned()
        .map(|sub| {
          let args: A = args.clone();

          guarded(sub.owner, move |runtime: &Runtime| {
            (*sub.call)(runtime, args);
          })
        })
        .collect()
    };

    runtime.queue().extend(batch);

    true
  }
}

impl<A> Clone for Signal<A> {
  fn clone(&self) -> Self {
    Self {
      inner: TArc::clone(&self.inner),
    }
  }
}

impl<A> Default for Signal<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A> Debug for Signal<A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Signal").field("subs", &self.len()).finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
