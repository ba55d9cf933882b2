use std::os::fd::RawFd;

use crate::core::EventFlags;

/// Identifier of one path watch inside the path watcher.
pub type WatchDescriptor = i32;

// -----------------------------------------------------------------------------
// Poll Key
// -----------------------------------------------------------------------------

/// Tagged key naming one watched entity.
///
/// The tag makes removal unambiguous: a descriptor, a path watch, and a
/// process watch live in different tables even when their numeric values
/// collide.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PollKey {
  /// A user-registered file descriptor.
  Fd(RawFd),
  /// A path watch, named by its watch descriptor.
  Wd(WatchDescriptor),
  /// A process watch, named by the target PID.
  Pid(i32),
}

// -----------------------------------------------------------------------------
// Process Event
// -----------------------------------------------------------------------------

/// Payload of one process lifecycle notification.
///
/// `exit_code` is the raw `wait(2)` status reported by the kernel; for a
/// normal exit the low-level code is `(exit_code >> 8) & 0xFF`. The field
/// is only meaningful on [`EXIT_EVENT`] records and is zero otherwise.
///
/// [`EXIT_EVENT`]: crate::core::EventFlags::EXIT_EVENT
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ProcessEvent {
  pub pid: i32,
  pub tgid: i32,
  pub exit_code: u32,
  pub exit_signal: u32,
}

// -----------------------------------------------------------------------------
// Poll Record
// -----------------------------------------------------------------------------

/// One entry of a poll wakeup.
///
/// Records live for exactly one loop iteration: the backend fills them, the
/// loop converts each into a deferred handler invocation, and the buffer is
/// cleared on the next poll.
#[derive(Clone, Debug)]
pub struct PollRecord {
  pub key: PollKey,
  pub flags: EventFlags,
  pub process: Option<ProcessEvent>,
}

impl PollRecord {
  /// Creates a record carrying no process payload.
  #[inline]
  pub(crate) const fn new(key: PollKey, flags: EventFlags) -> Self {
    Self {
      key,
      flags,
      process: None,
    }
  }

  /// Creates a record for a process notification.
  #[inline]
  pub(crate) const fn with_process(flags: EventFlags, event: ProcessEvent) -> Self {
    Self {
      key: PollKey::Pid(event.pid),
      flags,
      process: Some(event),
    }
  }
}
