use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use triomphe::Arc as TArc;

use crate::app::Runtime;
use crate::backend::Waker;
use crate::core::ObjectId;

/// A deferred invocation bound to its arguments.
///
/// The loop passes itself to every invocation, so closures never capture a
/// reference to the runtime they run inside.
pub(crate) type Deferred = Box<dyn FnOnce(&Runtime) + Send + 'static>;

/// Wraps `call` so it is silently skipped when `owner` has been released by
/// the time the queue drains it.
pub(crate) fn guarded<F>(owner: Option<ObjectId>, call: F) -> Deferred
where
  F: FnOnce(&Runtime) + Send + 'static,
{
  Box::new(move |runtime: &Runtime| {
    if let Some(id) = owner {
      if !runtime.anchors().is_live(id) {
        tracing::trace!(owner = %id, "delivery skipped: owner released");
        return;
      }
    }

    call(runtime);
  })
}

// -----------------------------------------------------------------------------
// Dispatch Queue
// -----------------------------------------------------------------------------

struct QueueState {
  fifo: VecDeque<Deferred>,
  quit: Option<i32>,
}

/// Thread-safe FIFO of deferred invocations.
///
/// Producers run on any thread; the consumer is the loop thread. Every
/// enqueue pings the backend waker so a loop blocked in the wait primitive
/// observes new work promptly.
pub(crate) struct DispatchQueue {
  state: CachePadded<Mutex<QueueState>>,
  waker: TArc<Waker>,
}

impl DispatchQueue {
  pub(crate) fn new(waker: TArc<Waker>, capacity: usize) -> Self {
    Self {
      state: CachePadded::new(Mutex::new(QueueState {
        fifo: VecDeque::with_capacity(capacity),
        quit: None,
      })),
      waker,
    }
  }

  /// Appends one invocation and wakes the loop.
  pub(crate) fn push(&self, deferred: Deferred) {
    self.state.lock().fifo.push_back(deferred);
    self.waker.ping();
  }

  /// Appends a batch inside a single critical section, then wakes the loop
  /// once. Concurrent batches interleave at whole-batch granularity.
  pub(crate) fn extend<I>(&self, batch: I)
  where
    I: IntoIterator<Item = Deferred>,
  {
    self.state.lock().fifo.extend(batch);
    self.waker.ping();
  }

  /// Pops and invokes one entry, returning `false` when the queue is empty.
  ///
  /// The invocation runs under no lock, so it may freely enqueue. A panic
  /// inside the invocation is caught here and logged; one misbehaving
  /// subscriber never stops the others from being dispatched.
  pub(crate) fn drain_one(&self, runtime: &Runtime) -> bool {
    let next: Option<Deferred> = self.state.lock().fifo.pop_front();

    let Some(call) = next else {
      return false;
    };

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| call(runtime))) {
      let reason: &str = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload");

      tracing::error!(reason, "deferred invocation panicked");
    }

    true
  }

  /// Commits a quit request. The first committed code wins; later calls
  /// keep the queue draining but change nothing.
  pub(crate) fn commit_quit(&self, code: i32) {
    let mut state = self.state.lock();

    if state.quit.is_none() {
      state.quit = Some(code);
    }
  }

  /// Returns the committed quit code, if any.
  #[inline]
  pub(crate) fn quit_code(&self) -> Option<i32> {
    self.state.lock().quit
  }

  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    self.state.lock().fifo.is_empty()
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.state.lock().fifo.len()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn queue() -> DispatchQueue {
    DispatchQueue::new(TArc::new(Waker::new()), 8)
  }

  #[test]
  fn test_push_then_len() {
    let queue: DispatchQueue = queue();

    assert!(queue.is_empty());

    queue.push(Box::new(|_rt| {}));
    queue.push(Box::new(|_rt| {}));

    assert_eq!(queue.len(), 2);
    assert!(!queue.is_empty());
  }

  #[test]
  fn test_quit_first_commit_wins() {
    let queue: DispatchQueue = queue();

    assert_eq!(queue.quit_code(), None);

    queue.commit_quit(5);
    queue.commit_quit(9);

    assert_eq!(queue.quit_code(), Some(5));
  }
}
