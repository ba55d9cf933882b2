//! OS-event backend: one wait primitive multiplexing descriptor readiness,
//! filesystem path events, and process lifecycle events.
//!
//! The backend owns every OS handle involved and keeps three watch tables,
//! one per event family. The single invariant tying them together: an entry
//! is present in a table exactly when the corresponding native registration
//! exists, so teardown is nothing more than dropping the owned descriptors.

mod paths;
mod poller;
mod process;
mod waker;

pub(crate) use self::waker::Waker;

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use triomphe::Arc as TArc;

use crate::app::Runtime;
use crate::consts::CAP_POLL_EVENTS;
use crate::core::EventFlags;
use crate::core::ObjectId;
use crate::core::PollKey;
use crate::core::PollRecord;
use crate::core::ProcessEvent;
use crate::core::WatchDescriptor;
use crate::core::check_group;
use crate::core::fatal;

use self::paths::PathWatcher;
use self::poller::EpollPoller;
use self::poller::from_native_fdflags;
use self::process::ProcessWatcher;

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

pub(crate) type FdCallback = Arc<dyn Fn(&Runtime, RawFd, EventFlags) + Send + Sync>;
pub(crate) type PathCallback = Arc<dyn Fn(&Runtime, WatchDescriptor, EventFlags) + Send + Sync>;
pub(crate) type ProcessCallback = Arc<dyn Fn(&Runtime, ProcessEvent) + Send + Sync>;

/// A registered callback together with its optional owner identity.
///
/// The owner is never dereferenced here; the loop re-checks it against the
/// identity table at delivery time and skips dead owners.
pub(crate) struct Handler<F> {
  pub(crate) owner: Option<ObjectId>,
  pub(crate) call: F,
}

impl<F: Clone> Clone for Handler<F> {
  fn clone(&self) -> Self {
    Self {
      owner: self.owner,
      call: self.call.clone(),
    }
  }
}

// -----------------------------------------------------------------------------
// Watch Tables
// -----------------------------------------------------------------------------

struct FdWatch {
  flags: EventFlags,
  handler: Handler<FdCallback>,
}

struct PathWatch {
  path: PathBuf,
  flags: EventFlags,
  handler: Handler<PathCallback>,
}

struct PathTable {
  watches: HashMap<WatchDescriptor, PathWatch>,
  /// Whether the path watcher's descriptor has joined the poller's
  /// interest set. Flipped by the first successful path watch and never
  /// cleared; a registered-but-idle descriptor reports nothing.
  online: bool,
}

struct PidWatch {
  pid: i32,
  flags: EventFlags,
  handler: Handler<ProcessCallback>,
}

// -----------------------------------------------------------------------------
// Backend
// -----------------------------------------------------------------------------

/// Settings consumed by [`Backend::new`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct BackendConfig {
  pub(crate) process_events: bool,
  pub(crate) poll_capacity: usize,
}

/// The unified OS-event multiplexer.
pub(crate) struct Backend {
  poller: EpollPoller,
  waker: TArc<Waker>,
  paths: Option<PathWatcher>,
  processes: Option<ProcessWatcher>,
  fd_watches: Mutex<HashMap<RawFd, FdWatch>>,
  path_watches: Mutex<PathTable>,
  pid_watches: Mutex<Vec<PidWatch>>,
  scratch: Mutex<Vec<(RawFd, u32)>>,
}

impl Backend {
  /// Brings up the wait primitive and its auxiliary streams.
  ///
  /// The epoll instance and the waker are mandatory and abort on failure.
  /// The path watcher and the process-events connector are best-effort:
  /// either may be unavailable (the connector usually for lack of
  /// privilege), in which case its feature is disabled and everything else
  /// keeps working.
  ///
  /// Only the waker and the connector join the poller's interest set
  /// here. The path watcher is merely allocated; its descriptor is
  /// registered by the first successful path watch.
  pub(crate) fn new(config: BackendConfig) -> Self {
    let poller: EpollPoller = EpollPoller::new(config.poll_capacity);
    let waker: TArc<Waker> = TArc::new(Waker::new());

    if let Err(error) = poller.watch(waker.raw(), EventFlags::READABLE, false) {
      fatal!(error);
    }

    let paths: Option<PathWatcher> = match PathWatcher::new() {
      Ok(watcher) => {
        tracing::debug!(fd = watcher.raw(), "path watcher allocated");
        Some(watcher)
      }
      Err(error) => {
        tracing::warn!(%error, "path watching disabled");
        None
      }
    };

    let processes: Option<ProcessWatcher> = if config.process_events {
      match ProcessWatcher::new() {
        Ok(watcher) => match poller.watch(watcher.raw(), EventFlags::READABLE, false) {
          Ok(()) => {
            tracing::debug!(fd = watcher.raw(), "process watcher ready");
            Some(watcher)
          }
          Err(error) => {
            tracing::warn!(%error, "process watching disabled");
            None
          }
        },
        Err(error) => {
          tracing::warn!(%error, "process watching disabled (privilege required)");
          None
        }
      }
    } else {
      None
    };

    Self {
      poller,
      waker,
      paths,
      processes,
      fd_watches: Mutex::new(HashMap::new()),
      path_watches: Mutex::new(PathTable {
        watches: HashMap::new(),
        online: false,
      }),
      pid_watches: Mutex::new(Vec::new()),
      scratch: Mutex::new(Vec::with_capacity(CAP_POLL_EVENTS)),
    }
  }

  #[inline]
  pub(crate) fn waker(&self) -> &TArc<Waker> {
    &self.waker
  }

  /// Returns `true` if the process-events connector is live.
  #[inline]
  pub(crate) fn process_events_enabled(&self) -> bool {
    self.processes.is_some()
  }

  // ---------------------------------------------------------------------------
  // Registration
  // ---------------------------------------------------------------------------

  /// Registers `fd`, or atomically replaces its flags and handler when it
  /// is already registered. On failure nothing changes.
  pub(crate) fn add(&self, fd: RawFd, flags: EventFlags, handler: Handler<FdCallback>) -> io::Result<()> {
    check_group(flags, EventFlags::DESCRIPTOR_GROUP)?;

    let mut watches = self.fd_watches.lock();
    let present: bool = watches.contains_key(&fd);

    self.poller.watch(fd, flags, present)?;
    watches.insert(fd, FdWatch { flags, handler });

    tracing::trace!(fd, ?flags, replaced = present, "descriptor watch updated");

    Ok(())
  }

  /// Registers a path watch and returns the descriptor naming it.
  ///
  /// The first successful call also registers the path watcher's own
  /// descriptor with the poller, so it is part of the interest set exactly
  /// when path watches can exist. A failure here leaves no partial state.
  pub(crate) fn watch_path(
    &self,
    path: &Path,
    flags: EventFlags,
    handler: Handler<PathCallback>,
  ) -> io::Result<WatchDescriptor> {
    check_group(flags, EventFlags::PATH_GROUP)?;

    let Some(watcher) = &self.paths else {
      return Err(io::Error::new(io::ErrorKind::Unsupported, "path watching unavailable"));
    };

    let mut table = self.path_watches.lock();
    let wd: WatchDescriptor = watcher.watch(path, flags)?;

    if !table.online {
      if let Err(error) = self.poller.watch(watcher.raw(), EventFlags::READABLE, false) {
        watcher.forget(wd);
        return Err(error);
      }

      table.online = true;
      tracing::trace!(fd = watcher.raw(), "path watcher registered with the poller");
    }

    table.watches.insert(wd, PathWatch {
      path: path.to_owned(),
      flags,
      handler,
    });

    tracing::trace!(wd, path = %path.display(), ?flags, "path watch added");

    Ok(wd)
  }

  /// Registers interest in lifecycle events of `pid`.
  ///
  /// Multiple registrations per PID are allowed; each is matched against
  /// observed events independently. Returns `false` when the flags are not
  /// process-group or the connector is disabled.
  pub(crate) fn watch_pid(&self, pid: i32, flags: EventFlags, handler: Handler<ProcessCallback>) -> bool {
    if !flags.is_within(EventFlags::PROCESS_GROUP) {
      tracing::trace!(pid, ?flags, "process watch rejected: wrong flag group");
      return false;
    }

    if self.processes.is_none() {
      tracing::trace!(pid, "process watch rejected: connector disabled");
      return false;
    }

    self.pid_watches.lock().push(PidWatch { pid, flags, handler });

    tracing::trace!(pid, ?flags, "process watch added");

    true
  }

  /// Removes the watch named by `key`. Unknown keys leave every table
  /// untouched and return `false`.
  pub(crate) fn remove(&self, key: PollKey) -> bool {
    match key {
      PollKey::Fd(fd) => {
        let mut watches = self.fd_watches.lock();

        let Some(watch) = watches.remove(&fd) else {
          return false;
        };

        self.poller.forget(fd);
        tracing::trace!(fd, flags = ?watch.flags, "descriptor watch removed");

        true
      }
      PollKey::Wd(wd) => {
        let mut table = self.path_watches.lock();

        let Some(watch) = table.watches.remove(&wd) else {
          return false;
        };

        if let Some(watcher) = &self.paths {
          watcher.forget(wd);
        }

        tracing::trace!(wd, path = %watch.path.display(), flags = ?watch.flags, "path watch removed");

        true
      }
      PollKey::Pid(pid) => {
        let mut watches = self.pid_watches.lock();
        let before: usize = watches.len();

        watches.retain(|watch| watch.pid != pid);

        let removed: bool = watches.len() != before;

        if removed {
          tracing::trace!(pid, "process watches removed");
        }

        removed
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Handler Lookup
  // ---------------------------------------------------------------------------

  pub(crate) fn fd_handler(&self, fd: RawFd) -> Option<Handler<FdCallback>> {
    self.fd_watches.lock().get(&fd).map(|watch| watch.handler.clone())
  }

  pub(crate) fn path_handler(&self, wd: WatchDescriptor) -> Option<Handler<PathCallback>> {
    self.path_watches.lock().watches.get(&wd).map(|watch| watch.handler.clone())
  }

  #[cfg(test)]
  pub(crate) fn path_watcher_online(&self) -> bool {
    self.path_watches.lock().online
  }

  /// Returns the handlers of every registration for `pid` whose interest
  /// intersects the observed flags.
  pub(crate) fn pid_handlers(&self, pid: i32, observed: EventFlags) -> Vec<Handler<ProcessCallback>> {
    self
      .pid_watches
      .lock()
      .iter()
      .filter(|watch| watch.pid == pid && watch.flags.intersects(observed))
      .map(|watch| watch.handler.clone())
      .collect()
  }

  // ---------------------------------------------------------------------------
  // Polling
  // ---------------------------------------------------------------------------

  /// Waits up to `timeout_ms` and decodes one batch of ready entities into
  /// `out`, which is cleared at entry.
  ///
  /// Returns `false` on timeout with no events or on an OS error; `out` is
  /// left empty in both cases. Auxiliary streams (path records, process
  /// messages) are drained here so the records the loop sees are already
  /// portable.
  pub(crate) fn poll(&self, timeout_ms: i32, out: &mut Vec<PollRecord>) -> bool {
    out.clear();

    let mut raw = self.scratch.lock();
    raw.clear();

    match self.poller.wait(timeout_ms, &mut raw) {
      Ok(0) => return false,
      Ok(_) => {}
      Err(error) => {
        tracing::warn!(%error, "poll failed");
        return false;
      }
    }

    for (fd, events) in raw.drain(..) {
      if fd == self.waker.raw() {
        self.waker.drain();
        continue;
      }

      if let Some(watcher) = &self.paths {
        if watcher.raw() == fd {
          watcher.drain(|wd, flags| out.push(PollRecord::new(PollKey::Wd(wd), flags)));
          continue;
        }
      }

      if let Some(watcher) = &self.processes {
        if watcher.raw() == fd {
          watcher.drain(|flags, event| out.push(PollRecord::with_process(flags, event)));
          continue;
        }
      }

      out.push(PollRecord::new(PollKey::Fd(fd), from_native_fdflags(events)));
    }

    !out.is_empty()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
