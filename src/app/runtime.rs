use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use triomphe::Arc as TArc;

use crate::backend::Backend;
use crate::backend::BackendConfig;
use crate::backend::Handler;
use crate::consts::CAP_ANCHOR_SLOTS;
use crate::consts::CAP_POLL_EVENTS;
use crate::consts::CAP_QUEUE_BUFFER;
use crate::core::AnchorTable;
use crate::core::EventFlags;
use crate::core::PollKey;
use crate::core::PollRecord;
use crate::core::ProcessEvent;
use crate::core::WatchDescriptor;
use crate::fabric::Anchor;
use crate::fabric::Deferred;
use crate::fabric::DispatchQueue;
use crate::fabric::guarded;

use super::timer::TimerCallback;
use super::timer::TimerId;
use super::timer::TimerTable;

// -----------------------------------------------------------------------------
// Runtime Config
// -----------------------------------------------------------------------------

/// Tuning knobs consumed by [`Runtime::with_config`].
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
  process_events: bool,
  poll_capacity: usize,
  queue_capacity: usize,
  anchor_capacity: usize,
}

impl RuntimeConfig {
  /// Enables or disables the process-events connector.
  ///
  /// Even when enabled, the connector silently degrades to disabled when
  /// the process lacks the privilege to subscribe.
  #[inline]
  pub fn process_events(mut self, value: bool) -> Self {
    self.process_events = value;
    self
  }

  /// Sets the maximum number of ready entries accepted per poll wakeup.
  #[inline]
  pub fn poll_capacity(mut self, value: usize) -> Self {
    self.poll_capacity = value;
    self
  }

  /// Sets the initial capacity of the dispatch queue.
  #[inline]
  pub fn queue_capacity(mut self, value: usize) -> Self {
    self.queue_capacity = value;
    self
  }

  /// Sets the initial capacity of the identity table.
  #[inline]
  pub fn anchor_capacity(mut self, value: usize) -> Self {
    self.anchor_capacity = value;
    self
  }
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      process_events: true,
      poll_capacity: CAP_POLL_EVENTS,
      queue_capacity: CAP_QUEUE_BUFFER,
      anchor_capacity: CAP_ANCHOR_SLOTS,
    }
  }
}

// -----------------------------------------------------------------------------
// Runtime
// -----------------------------------------------------------------------------

/// Shared state of one event core.
///
/// Everything the loop touches - the identity table, the dispatch queue,
/// the OS-event backend, and the timer registry - lives here, so tests and
/// embedders can instantiate as many independent cores as they like. The
/// runtime is shared via [`Arc`]; any thread may register watches, emit
/// signals, enqueue invocations, or request termination, while callbacks
/// run exclusively on the thread driving [`Application::exec`].
///
/// [`Application::exec`]: crate::app::Application::exec
pub struct Runtime {
  anchors: TArc<AnchorTable>,
  queue: DispatchQueue,
  backend: Backend,
  timers: TimerTable,
}

impl Runtime {
  /// Creates a runtime with default settings.
  pub fn new() -> Arc<Self> {
    Self::with_config(RuntimeConfig::default())
  }

  /// Creates a runtime from explicit settings.
  pub fn with_config(config: RuntimeConfig) -> Arc<Self> {
    let backend: Backend = Backend::new(BackendConfig {
      process_events: config.process_events,
      poll_capacity: config.poll_capacity,
    });

    let queue: DispatchQueue = DispatchQueue::new(TArc::clone(backend.waker()), config.queue_capacity);

    tracing::debug!(
      process_events = backend.process_events_enabled(),
      "runtime ready"
    );

    Arc::new(Self {
      anchors: TArc::new(AnchorTable::with_capacity(config.anchor_capacity)),
      queue,
      backend,
      timers: TimerTable::new(),
    })
  }

  // ---------------------------------------------------------------------------
  // Internal Access
  // ---------------------------------------------------------------------------

  #[inline]
  pub(crate) fn anchors(&self) -> &AnchorTable {
    &self.anchors
  }

  #[inline]
  pub(crate) fn queue(&self) -> &DispatchQueue {
    &self.queue
  }

  #[inline]
  pub(crate) fn backend(&self) -> &Backend {
    &self.backend
  }

  #[inline]
  pub(crate) fn timers(&self) -> &TimerTable {
    &self.timers
  }

  // ---------------------------------------------------------------------------
  // Identity
  // ---------------------------------------------------------------------------

  /// Mints a live subscriber identity.
  pub fn anchor(&self) -> Anchor {
    Anchor::acquire(&self.anchors)
  }

  // ---------------------------------------------------------------------------
  // Watch Registration
  // ---------------------------------------------------------------------------

  /// Registers `fd` for readiness events, or atomically replaces an
  /// existing registration for the same descriptor.
  ///
  /// Deliveries for an `owner`-bound registration stop silently once the
  /// owner's anchor is dropped.
  pub fn connect_fd<F>(
    &self,
    fd: RawFd,
    flags: EventFlags,
    owner: Option<&Anchor>,
    call: F,
  ) -> io::Result<()>
  where
    F: Fn(&Runtime, RawFd, EventFlags) + Send + Sync + 'static,
  {
    self.backend.add(fd, flags, Handler {
      owner: owner.map(Anchor::id),
      call: Arc::new(call),
    })
  }

  /// Registers a filesystem path watch.
  pub fn watch_path<P, F>(
    &self,
    path: P,
    flags: EventFlags,
    owner: Option<&Anchor>,
    call: F,
  ) -> io::Result<WatchDescriptor>
  where
    P: AsRef<Path>,
    F: Fn(&Runtime, WatchDescriptor, EventFlags) + Send + Sync + 'static,
  {
    self.backend.watch_path(path.as_ref(), flags, Handler {
      owner: owner.map(Anchor::id),
      call: Arc::new(call),
    })
  }

  /// Registers interest in lifecycle events of `pid`.
  ///
  /// Returns `false` when process watching is unavailable; the caller can
  /// probe availability up front via [`process_events_enabled`].
  ///
  /// [`process_events_enabled`]: Self::process_events_enabled
  pub fn watch_pid<F>(&self, pid: i32, flags: EventFlags, owner: Option<&Anchor>, call: F) -> bool
  where
    F: Fn(&Runtime, ProcessEvent) + Send + Sync + 'static,
  {
    self.backend.watch_pid(pid, flags, Handler {
      owner: owner.map(Anchor::id),
      call: Arc::new(call),
    })
  }

  /// Removes the watch named by `key`; unknown keys return `false`.
  pub fn remove(&self, key: PollKey) -> bool {
    self.backend.remove(key)
  }

  /// Returns `true` if the process-events connector is live.
  pub fn process_events_enabled(&self) -> bool {
    self.backend.process_events_enabled()
  }

  // ---------------------------------------------------------------------------
  // Timers
  // ---------------------------------------------------------------------------

  /// Arms a timer due after `delay`, repeating every `period` when given.
  /// The loop wakes immediately to take the new deadline into account.
  pub fn start_timer<F>(
    &self,
    delay: Duration,
    period: Option<Duration>,
    owner: Option<&Anchor>,
    call: F,
  ) -> TimerId
  where
    F: Fn(&Runtime) + Send + Sync + 'static,
  {
    let callback: TimerCallback = Arc::new(call);
    let id: TimerId = self.timers.register(delay, period, owner.map(Anchor::id), callback);

    self.backend.waker().ping();

    id
  }

  /// Disarms a timer. Unknown or already-fired IDs return `false`.
  pub fn stop_timer(&self, id: TimerId) -> bool {
    self.timers.cancel(id)
  }

  // ---------------------------------------------------------------------------
  // Dispatch
  // ---------------------------------------------------------------------------

  /// Defers `call` onto the dispatch queue from any thread.
  pub fn enqueue<F>(&self, call: F)
  where
    F: FnOnce(&Runtime) + Send + 'static,
  {
    self.queue.push(Box::new(call));
  }

  /// Requests loop termination with `code`.
  ///
  /// The request is itself a deferred invocation, so it commits at a safe
  /// point between callbacks, never mid-callback. The first committed code
  /// wins; the loop finishes the closure it is running and returns.
  pub fn quit(&self, code: i32) {
    self.enqueue(move |runtime: &Runtime| {
      runtime.queue.commit_quit(code);
      tracing::debug!(code, "quit committed");
    });
  }

  /// Computes the poll timeout for the next loop iteration: zero when
  /// deferred work is pending, the earliest timer deadline otherwise, and
  /// forever when neither exists.
  pub(crate) fn timeout_hint(&self) -> i32 {
    if !self.queue.is_empty() {
      return 0;
    }

    match self.timers.next_deadline() {
      Some(deadline) => crate::utils::millis_until(deadline),
      None => -1,
    }
  }

  /// Converts one poll batch into deferred handler invocations, preserving
  /// the OS-reported order as one contiguous block.
  pub(crate) fn dispatch_records(&self, records: &mut Vec<PollRecord>) {
    if records.is_empty() {
      return;
    }

    let mut batch: Vec<Deferred> = Vec::with_capacity(records.len());

    for record in records.drain(..) {
      let flags: EventFlags = record.flags;

      match record.key {
        PollKey::Fd(fd) => {
          let Some(handler) = self.backend.fd_handler(fd) else {
            tracing::trace!(fd, "record dropped: descriptor no longer watched");
            continue;
          };

          batch.push(guarded(handler.owner, move |runtime: &Runtime| {
            (*handler.call)(runtime, fd, flags);
          }));
        }
        PollKey::Wd(wd) => {
          let Some(handler) = self.backend.path_handler(wd) else {
            tracing::trace!(wd, "record dropped: path no longer watched");
            continue;
          };

          batch.push(guarded(handler.owner, move |runtime: &Runtime| {
            (*handler.call)(runtime, wd, flags);
          }));
        }
        PollKey::Pid(pid) => {
          let Some(event) = record.process else {
            continue;
          };

          for handler in self.backend.pid_handlers(pid, flags) {
            batch.push(guarded(handler.owner, move |runtime: &Runtime| {
              (*handler.call)(runtime, event);
            }));
          }
        }
      }
    }

    if !batch.is_empty() {
      self.queue.extend(batch);
    }
  }
}
