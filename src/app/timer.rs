use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::app::Runtime;
use crate::core::ObjectId;
use crate::fabric::Anchor;
use crate::fabric::Deferred;
use crate::fabric::Signal;
use crate::fabric::guarded;

// -----------------------------------------------------------------------------
// Timer Id
// -----------------------------------------------------------------------------

/// Identifier of one armed timer, unique for the runtime's lifetime.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TimerId {
  value: u64,
}

impl Display for TimerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "#TIMER<{}>", self.value)
  }
}

// -----------------------------------------------------------------------------
// Timer Table
// -----------------------------------------------------------------------------

pub(crate) type TimerCallback = Arc<dyn Fn(&Runtime) + Send + Sync>;

struct TimerEntry {
  deadline: Instant,
  period: Option<Duration>,
  owner: Option<ObjectId>,
  call: TimerCallback,
}

struct TimerState {
  entries: HashMap<u64, TimerEntry>,
  next_id: u64,
}

/// Registry of pending timer deadlines.
///
/// The loop asks for the earliest deadline when computing its poll timeout
/// and fires due entries right after the poll returns. Repeating entries
/// re-arm by whole periods, so a delayed loop catches up one tick per
/// iteration instead of bursting.
pub(crate) struct TimerTable {
  state: Mutex<TimerState>,
}

impl TimerTable {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(TimerState {
        entries: HashMap::new(),
        next_id: 0,
      }),
    }
  }

  /// Arms a timer due after `delay`, repeating every `period` when given.
  pub(crate) fn register(
    &self,
    delay: Duration,
    period: Option<Duration>,
    owner: Option<ObjectId>,
    call: TimerCallback,
  ) -> TimerId {
    let mut state = self.state.lock();

    let id: u64 = state.next_id;
    state.next_id += 1;

    state.entries.insert(id, TimerEntry {
      deadline: Instant::now() + delay,
      period,
      owner,
      call,
    });

    tracing::trace!(timer = %TimerId { value: id }, ?delay, ?period, "timer armed");

    TimerId { value: id }
  }

  /// Disarms a timer. Unknown IDs (including already-fired one-shots)
  /// return `false`.
  pub(crate) fn cancel(&self, id: TimerId) -> bool {
    let removed: bool = self.state.lock().entries.remove(&id.value).is_some();

    if removed {
      tracing::trace!(timer = %id, "timer disarmed");
    }

    removed
  }

  /// Returns the earliest pending deadline.
  pub(crate) fn next_deadline(&self) -> Option<Instant> {
    self.state.lock().entries.values().map(|entry| entry.deadline).min()
  }

  /// Enqueues the callback of every due entry and re-arms the repeating
  /// ones. Must run on the loop thread, right after the poll returns.
  pub(crate) fn fire_due(&self, runtime: &Runtime) {
    let now: Instant = Instant::now();

    let batch: Vec<Deferred> = {
      let mut state = self.state.lock();
      let mut batch: Vec<Deferred> = Vec::new();
      let mut spent: Vec<u64> = Vec::new();

      for (id, entry) in state.entries.iter_mut() {
        if entry.deadline > now {
          continue;
        }

        let call: TimerCallback = Arc::clone(&entry.call);

        batch.push(guarded(entry.owner, move |runtime: &Runtime| {
          (*call)(runtime);
        }));

        match entry.period {
          Some(period) => entry.deadline += period,
          None => spent.push(*id),
        }
      }

      for id in spent {
        state.entries.remove(&id);
      }

      batch
    };

    if !batch.is_empty() {
      runtime.queue().extend(batch);
    }
  }
}

// -----------------------------------------------------------------------------
// Timer Event
// -----------------------------------------------------------------------------

/// A timer object publishing its expiry as a signal.
///
/// The timer owns an [`Anchor`], so dropping it silently cancels any expiry
/// that is already sitting in the dispatch queue.
pub struct TimerEvent {
  anchor: Anchor,
  expired: Signal<()>,
  armed: Mutex<Option<TimerId>>,
}

impl TimerEvent {
  pub fn new(runtime: &Runtime) -> Self {
    Self {
      anchor: runtime.anchor(),
      expired: Signal::new(),
      armed: Mutex::new(None),
    }
  }

  /// The signal emitted on every expiry.
  #[inline]
  pub fn expired(&self) -> &Signal<()> {
    &self.expired
  }

  /// Arms the timer to fire after `delay`, and every `delay` thereafter
  /// when `repeat` is set. A previously armed deadline is replaced.
  pub fn start(&self, runtime: &Runtime, delay: Duration, repeat: bool) {
    self.stop(runtime);

    let signal: Signal<()> = self.expired.clone();

    let id: TimerId = runtime.start_timer(delay, repeat.then_some(delay), Some(&self.anchor), move |runtime| {
      signal.emit(runtime, ());
    });

    *self.armed.lock() = Some(id);
  }

  /// Disarms the timer. Returns `false` when it was not armed.
  pub fn stop(&self, runtime: &Runtime) -> bool {
    match self.armed.lock().take() {
      Some(id) => runtime.stop_timer(id),
      None => false,
    }
  }
}

impl Debug for TimerEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("TimerEvent")
      .field("anchor", &self.anchor)
      .field("armed", &*self.armed.lock())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_register_and_cancel() {
    let table: TimerTable = TimerTable::new();

    let id: TimerId = table.register(
      Duration::from_millis(10),
      None,
      None,
      Arc::new(|_rt| {}),
    );

    assert!(table.next_deadline().is_some());
    assert!(table.cancel(id));
    assert!(!table.cancel(id));
    assert!(table.next_deadline().is_none());
  }

  #[test]
  fn test_next_deadline_is_earliest() {
    let table: TimerTable = TimerTable::new();
    let noop: TimerCallback = Arc::new(|_rt| {});

    table.register(Duration::from_millis(500), None, None, Arc::clone(&noop));

    let soon: TimerId = table.register(Duration::from_millis(5), None, None, noop);
    let deadline: Instant = table.next_deadline().unwrap();

    assert!(deadline <= Instant::now() + Duration::from_millis(5));

    table.cancel(soon);

    assert!(table.next_deadline().unwrap() > deadline);
  }

  #[test]
  fn test_ids_are_unique() {
    let table: TimerTable = TimerTable::new();

    let first: TimerId = table.register(Duration::ZERO, None, None, Arc::new(|_rt| {}));
    let second: TimerId = table.register(Duration::ZERO, None, None, Arc::new(|_rt| {}));

    assert_ne!(first, second);
  }
}
