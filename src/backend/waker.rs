use std::io;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

use crate::core::fatal;
use crate::utils::ignore_eintr;

// -----------------------------------------------------------------------------
// Waker
// -----------------------------------------------------------------------------

/// Cross-thread wake handle for a loop blocked in the wait primitive.
///
/// The waker is an `eventfd` registered with the poller for the backend's
/// whole lifetime. Pinging it from any thread makes the pending poll return
/// promptly, which is how cross-thread enqueues reach a sleeping loop.
#[derive(Debug)]
pub(crate) struct Waker {
  fd: OwnedFd,
}

impl Waker {
  /// Creates the wake handle. The loop cannot run without one, so failure
  /// aborts.
  pub(crate) fn new() -> Self {
    let fd: RawFd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };

    if fd < 0 {
      fatal!(io::Error::last_os_error());
    }

    Self {
      // SAFETY: `eventfd` returned a fresh descriptor that we now own.
      fd: unsafe { OwnedFd::from_raw_fd(fd) },
    }
  }

  #[inline]
  pub(crate) fn raw(&self) -> RawFd {
    self.fd.as_raw_fd()
  }

  /// Forces the next (or current) poll to return.
  pub(crate) fn ping(&self) {
    let value: u64 = 1;

    let result: io::Result<()> = ignore_eintr(|| {
      let written: isize = unsafe {
        libc::write(
          self.fd.as_raw_fd(),
          (&raw const value).cast(),
          size_of::<u64>(),
        )
      };

      if written < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(())
      }
    });

    // A full counter still wakes the poller, so saturation is harmless.
    if let Err(error) = result {
      if error.kind() != io::ErrorKind::WouldBlock {
        tracing::warn!(%error, "waker ping failed");
      }
    }
  }

  /// Consumes any pending pings after the poller reported readiness.
  pub(crate) fn drain(&self) {
    let mut value: u64 = 0;

    let _ignore: io::Result<()> = ignore_eintr(|| {
      let read: isize = unsafe {
        libc::read(
          self.fd.as_raw_fd(),
          (&raw mut value).cast(),
          size_of::<u64>(),
        )
      };

      if read < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(())
      }
    });
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
