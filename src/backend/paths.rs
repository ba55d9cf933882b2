use std::ffi::CString;
use std::io;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use crate::consts::CAP_PATH_BUFFER;
use crate::core::EventFlags;
use crate::core::WatchDescriptor;
use crate::utils::ignore_eintr;

// -----------------------------------------------------------------------------
// Flag Translation
// -----------------------------------------------------------------------------

/// Translates portable path flags to the native inotify mask.
pub(crate) const fn to_native_pathflags(flags: EventFlags) -> u32 {
  let mut native: u32 = 0;

  if flags.contains(EventFlags::READ_EVENT) {
    native |= libc::IN_ACCESS;
  }
  if flags.contains(EventFlags::WRITE_EVENT) {
    native |= libc::IN_MODIFY;
  }
  if flags.contains(EventFlags::ATTRIBUTE_MOD) {
    native |= libc::IN_ATTRIB;
  }
  if flags.contains(EventFlags::MOVED) {
    native |= libc::IN_MOVE_SELF;
  }

  native
}

/// Translates a native inotify mask back to portable path flags.
///
/// Administrative bits (`IN_IGNORED`, `IN_Q_OVERFLOW`, ...) translate to an
/// empty set and are dropped by the caller.
pub(crate) const fn from_native_pathflags(native: u32) -> EventFlags {
  let mut flags: EventFlags = EventFlags::empty();

  if native & libc::IN_ACCESS != 0 {
    flags = flags.union(EventFlags::READ_EVENT);
  }
  if native & libc::IN_MODIFY != 0 {
    flags = flags.union(EventFlags::WRITE_EVENT);
  }
  if native & libc::IN_ATTRIB != 0 {
    flags = flags.union(EventFlags::ATTRIBUTE_MOD);
  }
  if native & libc::IN_MOVE_SELF != 0 {
    flags = flags.union(EventFlags::MOVED);
  }

  flags
}

// -----------------------------------------------------------------------------
// Path Watcher
// -----------------------------------------------------------------------------

/// Thin owner of the inotify instance.
///
/// The instance descriptor itself is registered with the poller by the
/// backend; readiness on it means the record stream below has data.
#[derive(Debug)]
pub(crate) struct PathWatcher {
  fd: OwnedFd,
}

impl PathWatcher {
  /// Creates the inotify instance. Failure disables path watching but
  /// leaves the rest of the backend intact.
  pub(crate) fn new() -> io::Result<Self> {
    let fd: RawFd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC | libc::IN_NONBLOCK) };

    if fd < 0 {
      return Err(io::Error::last_os_error());
    }

    Ok(Self {
      // SAFETY: `inotify_init1` returned a fresh descriptor that we now own.
      fd: unsafe { OwnedFd::from_raw_fd(fd) },
    })
  }

  #[inline]
  pub(crate) fn raw(&self) -> RawFd {
    self.fd.as_raw_fd()
  }

  /// Registers `path` and returns the watch descriptor naming it.
  pub(crate) fn watch(&self, path: &Path, flags: EventFlags) -> io::Result<WatchDescriptor> {
    let native: CString = CString::new(path.as_os_str().as_bytes())
      .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    let wd: libc::c_int = unsafe {
      libc::inotify_add_watch(self.fd.as_raw_fd(), native.as_ptr(), to_native_pathflags(flags))
    };

    if wd < 0 {
      return Err(io::Error::last_os_error());
    }

    Ok(wd)
  }

  /// Unregisters a watch descriptor.
  pub(crate) fn forget(&self, wd: WatchDescriptor) -> bool {
    unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) == 0 }
  }

  /// Drains one batch of pending records.
  ///
  /// Records are variable length: a fixed header followed by an optional
  /// NUL-padded name. Each record that translates to a non-empty portable
  /// set is passed to `visit`; administrative records are dropped. The
  /// descriptor is level triggered in the poller, so a batch larger than
  /// the buffer is reported again on the next poll.
  pub(crate) fn drain<F>(&self, mut visit: F)
  where
    F: FnMut(WatchDescriptor, EventFlags),
  {
    let mut buffer: [u8; CAP_PATH_BUFFER] = [0; CAP_PATH_BUFFER];

    let length: isize = match ignore_eintr(|| {
      let length: isize = unsafe {
        libc::read(self.fd.as_raw_fd(), buffer.as_mut_ptr().cast(), buffer.len())
      };

      if length < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(length)
      }
    }) {
      Ok(length) => length,
      Err(error) if error.kind() == io::ErrorKind::WouldBlock => return,
      Err(error) => {
        tracing::warn!(%error, "path watcher drain failed");
        return;
      }
    };

    let mut cursor: usize = 0;
    let header: usize = size_of::<libc::inotify_event>();

    while cursor + header <= length as usize {
      // SAFETY: The kernel wrote a full record header at `cursor` and the
      //         bounds check above keeps the read inside the buffer.
      let record: libc::inotify_event =
        unsafe { ptr::read_unaligned(buffer.as_ptr().add(cursor).cast()) };

      cursor += header + record.len as usize;

      let flags: EventFlags = from_native_pathflags(record.mask);

      if flags.is_empty() {
        tracing::trace!(wd = record.wd, mask = record.mask, "administrative path record dropped");
        continue;
      }

      visit(record.wd, flags);
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
