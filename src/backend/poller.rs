use parking_lot::Mutex;
use std::io;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

use crate::core::EventFlags;
use crate::core::fatal;
use crate::utils::ignore_eintr;

// -----------------------------------------------------------------------------
// Flag Translation
// -----------------------------------------------------------------------------

/// Translates portable descriptor flags to the native epoll flag set.
pub(crate) const fn to_native_fdflags(flags: EventFlags) -> u32 {
  let mut native: u32 = 0;

  if flags.contains(EventFlags::ERROR) {
    native |= libc::EPOLLERR as u32;
  }
  if flags.contains(EventFlags::DISCONNECTED) {
    native |= libc::EPOLLHUP as u32;
  }
  if flags.contains(EventFlags::READABLE) {
    native |= libc::EPOLLIN as u32;
  }
  if flags.contains(EventFlags::WRITABLE) {
    native |= libc::EPOLLOUT as u32;
  }
  if flags.contains(EventFlags::EDGE_TRIGGER) {
    native |= libc::EPOLLET as u32;
  }

  native
}

/// Translates a native epoll flag set back to portable descriptor flags.
pub(crate) const fn from_native_fdflags(native: u32) -> EventFlags {
  let mut flags: EventFlags = EventFlags::empty();

  if native & libc::EPOLLERR as u32 != 0 {
    flags = flags.union(EventFlags::ERROR);
  }
  if native & libc::EPOLLHUP as u32 != 0 {
    flags = flags.union(EventFlags::DISCONNECTED);
  }
  if native & libc::EPOLLIN as u32 != 0 {
    flags = flags.union(EventFlags::READABLE);
  }
  if native & libc::EPOLLOUT as u32 != 0 {
    flags = flags.union(EventFlags::WRITABLE);
  }
  if native & libc::EPOLLET as u32 != 0 {
    flags = flags.union(EventFlags::EDGE_TRIGGER);
  }

  flags
}

// -----------------------------------------------------------------------------
// Epoll Poller
// -----------------------------------------------------------------------------

/// Thin owner of the epoll instance.
///
/// The poller knows nothing about watch bookkeeping; [`Backend`] keeps the
/// maps and guarantees that a descriptor is registered here exactly when it
/// has a map entry.
///
/// [`Backend`]: crate::backend::Backend
pub(crate) struct EpollPoller {
  fd: OwnedFd,
  scratch: Mutex<Vec<libc::epoll_event>>,
}

impl EpollPoller {
  /// Creates the epoll instance. The core is unusable without one, so
  /// failure aborts.
  pub(crate) fn new(capacity: usize) -> Self {
    let fd: RawFd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };

    if fd < 0 {
      fatal!(io::Error::last_os_error());
    }

    Self {
      // SAFETY: `epoll_create1` returned a fresh descriptor that we now own.
      fd: unsafe { OwnedFd::from_raw_fd(fd) },
      scratch: Mutex::new(vec![
        libc::epoll_event { events: 0, u64: 0 };
        capacity.max(1)
      ]),
    }
  }

  /// Registers `fd`, or updates its interest set when already registered.
  ///
  /// Tries the operation matching `present` first and falls back on the
  /// opposite one, so a caller whose bookkeeping went stale (descriptor
  /// closed and reopened with the same number) still converges.
  pub(crate) fn watch(&self, fd: RawFd, flags: EventFlags, present: bool) -> io::Result<()> {
    let mut event: libc::epoll_event = libc::epoll_event {
      events: to_native_fdflags(flags),
      u64: fd as u64,
    };

    let (first, second): (libc::c_int, libc::c_int) = if present {
      (libc::EPOLL_CTL_MOD, libc::EPOLL_CTL_ADD)
    } else {
      (libc::EPOLL_CTL_ADD, libc::EPOLL_CTL_MOD)
    };

    if self.control(first, fd, &mut event).is_ok() {
      return Ok(());
    }

    self.control(second, fd, &mut event)
  }

  /// Deletes `fd` from the interest set.
  ///
  /// `ENOENT` and `EBADF` are tolerated: the kernel drops closed
  /// descriptors on its own, and the map entry must still go away.
  pub(crate) fn forget(&self, fd: RawFd) {
    let mut event: libc::epoll_event = libc::epoll_event { events: 0, u64: 0 };

    if let Err(error) = self.control(libc::EPOLL_CTL_DEL, fd, &mut event) {
      tracing::trace!(fd, %error, "poller forget ignored an OS error");
    }
  }

  /// Waits up to `timeout_ms` and appends raw `(fd, events)` pairs to `out`.
  ///
  /// A negative timeout waits forever, zero reports without blocking.
  /// Interruption is retried; the full timeout restarts, which is within
  /// the loop's tolerance.
  pub(crate) fn wait(&self, timeout_ms: i32, out: &mut Vec<(RawFd, u32)>) -> io::Result<usize> {
    let mut scratch = self.scratch.lock();
    let capacity: libc::c_int = scratch.len() as libc::c_int;

    let count: libc::c_int = ignore_eintr(|| {
      let count: libc::c_int = unsafe {
        libc::epoll_wait(self.fd.as_raw_fd(), scratch.as_mut_ptr(), capacity, timeout_ms)
      };

      if count < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(count)
      }
    })?;

    for entry in &scratch[..count as usize] {
      out.push((entry.u64 as RawFd, entry.events));
    }

    Ok(count as usize)
  }

  fn control(&self, op: libc::c_int, fd: RawFd, event: &mut libc::epoll_event) -> io::Result<()> {
    let result: libc::c_int = unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, event) };

    if result < 0 {
      Err(io::Error::last_os_error())
    } else {
      Ok(())
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fdflags_bijection() {
    // Every subset of the descriptor group survives the native round-trip.
    for bits in 0..=EventFlags::DESCRIPTOR_GROUP.bits() {
      let Some(flags) = EventFlags::from_bits(bits) else {
        continue;
      };

      if !EventFlags::DESCRIPTOR_GROUP.contains(flags) {
        continue;
      }

      assert_eq!(from_native_fdflags(to_native_fdflags(flags)), flags);
    }
  }

  #[test]
  fn test_fdflags_distinct() {
    for flag in EventFlags::DESCRIPTOR_GROUP.iter() {
      assert_eq!(to_native_fdflags(flag).count_ones(), 1, "{flag:?}");
    }
  }

  #[test]
  fn test_watch_and_forget() {
    let poller: EpollPoller = EpollPoller::new(8);
    let mut fds: [RawFd; 2] = [0; 2];

    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

    poller.watch(fds[0], EventFlags::READABLE, false).unwrap();
    // Re-registering with `present` replaces the interest set.
    poller.watch(fds[0], EventFlags::READABLE | EventFlags::WRITABLE, true).unwrap();
    poller.forget(fds[0]);
    // Forgetting an unknown descriptor is tolerated.
    poller.forget(fds[0]);

    unsafe {
      libc::close(fds[0]);
      libc::close(fds[1]);
    }
  }

  #[test]
  fn test_wait_reports_readable() {
    let poller: EpollPoller = EpollPoller::new(8);
    let mut fds: [RawFd; 2] = [0; 2];

    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

    poller.watch(fds[0], EventFlags::READABLE, false).unwrap();

    assert_eq!(unsafe { libc::write(fds[1], b"x".as_ptr().cast(), 1) }, 1);

    let mut out: Vec<(RawFd, u32)> = Vec::new();
    let count: usize = poller.wait(1000, &mut out).unwrap();

    assert_eq!(count, 1);
    assert_eq!(out[0].0, fds[0]);
    assert!(from_native_fdflags(out[0].1).contains(EventFlags::READABLE));

    unsafe {
      libc::close(fds[0]);
      libc::close(fds[1]);
    }
  }

  #[test]
  fn test_wait_timeout_is_empty() {
    let poller: EpollPoller = EpollPoller::new(8);
    let mut out: Vec<(RawFd, u32)> = Vec::new();

    assert_eq!(poller.wait(0, &mut out).unwrap(), 0);
    assert!(out.is_empty());
  }
}
