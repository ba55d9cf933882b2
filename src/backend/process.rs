use std::io;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;
use std::ptr;

use crate::consts::CAP_PROCESS_BUFFER;
use crate::core::EventFlags;
use crate::core::ProcessEvent;
use crate::utils::ignore_eintr;

// -----------------------------------------------------------------------------
// Kernel ABI
//
// The process-events connector speaks a small netlink dialect that libc does
// not cover; the constants and layouts below mirror <linux/cn_proc.h> and
// <linux/connector.h>.
// -----------------------------------------------------------------------------

const CN_IDX_PROC: u32 = 0x1;
const CN_VAL_PROC: u32 = 0x1;

const PROC_CN_MCAST_LISTEN: u32 = 0x1;

const PROC_EVENT_FORK: u32 = 0x0000_0001;
const PROC_EVENT_EXEC: u32 = 0x0000_0002;
const PROC_EVENT_UID: u32 = 0x0000_0004;
const PROC_EVENT_GID: u32 = 0x0000_0040;
const PROC_EVENT_SID: u32 = 0x0000_0080;
const PROC_EVENT_EXIT: u32 = 0x8000_0000;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)] // written to the kernel as raw bytes
struct CnMsgHeader {
  idx: u32,
  val: u32,
  seq: u32,
  ack: u32,
  len: u16,
  flags: u16,
}

#[repr(C)]
#[allow(dead_code)] // written to the kernel as raw bytes
struct McastRequest {
  header: libc::nlmsghdr,
  body: CnMsgHeader,
  op: u32,
}

/// Leading fields of the kernel's `proc_event`; every arm of the payload
/// union starts with the acting pid/tgid pair, and the exit arm follows
/// with the raw wait status.
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)] // mirrors the kernel layout; not every field is consumed
struct ProcEventRecord {
  what: u32,
  cpu: u32,
  timestamp_ns: u64,
  pid: i32,
  tgid: i32,
  exit_code: u32,
  exit_signal: u32,
}

const NLMSG_HEADER: usize = size_of::<libc::nlmsghdr>();
const CN_MSG_HEADER: usize = size_of::<CnMsgHeader>();

const _: () = assert!(NLMSG_HEADER == 16);
const _: () = assert!(CN_MSG_HEADER == 20);
const _: () = assert!(size_of::<McastRequest>() == 40);

// -----------------------------------------------------------------------------
// Flag Translation
// -----------------------------------------------------------------------------

/// Translates portable process flags to the native connector event mask.
pub(crate) const fn to_native_procflags(flags: EventFlags) -> u32 {
  let mut native: u32 = 0;

  if flags.contains(EventFlags::EXEC_EVENT) {
    native |= PROC_EVENT_EXEC;
  }
  if flags.contains(EventFlags::EXIT_EVENT) {
    native |= PROC_EVENT_EXIT;
  }
  if flags.contains(EventFlags::FORK_EVENT) {
    native |= PROC_EVENT_FORK;
  }
  if flags.contains(EventFlags::UID_EVENT) {
    native |= PROC_EVENT_UID;
  }
  if flags.contains(EventFlags::GID_EVENT) {
    native |= PROC_EVENT_GID;
  }
  if flags.contains(EventFlags::SID_EVENT) {
    native |= PROC_EVENT_SID;
  }

  native
}

/// Translates a native connector event mask back to portable process flags.
pub(crate) const fn from_native_procflags(native: u32) -> EventFlags {
  let mut flags: EventFlags = EventFlags::empty();

  if native & PROC_EVENT_EXEC != 0 {
    flags = flags.union(EventFlags::EXEC_EVENT);
  }
  if native & PROC_EVENT_EXIT != 0 {
    flags = flags.union(EventFlags::EXIT_EVENT);
  }
  if native & PROC_EVENT_FORK != 0 {
    flags = flags.union(EventFlags::FORK_EVENT);
  }
  if native & PROC_EVENT_UID != 0 {
    flags = flags.union(EventFlags::UID_EVENT);
  }
  if native & PROC_EVENT_GID != 0 {
    flags = flags.union(EventFlags::GID_EVENT);
  }
  if native & PROC_EVENT_SID != 0 {
    flags = flags.union(EventFlags::SID_EVENT);
  }

  flags
}

// -----------------------------------------------------------------------------
// Process Watcher
// -----------------------------------------------------------------------------

/// Owner of the process-events connector socket.
///
/// Subscribing to the connector multicast group requires privilege; failure
/// here disables process watching without impairing anything else.
#[derive(Debug)]
pub(crate) struct ProcessWatcher {
  fd: OwnedFd,
}

impl ProcessWatcher {
  /// Opens the connector socket, binds to the process-events group, and
  /// enables multicast delivery.
  pub(crate) fn new() -> io::Result<Self> {
    let raw: RawFd = unsafe {
      libc::socket(
        libc::AF_NETLINK,
        libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
        libc::NETLINK_CONNECTOR,
      )
    };

    if raw < 0 {
      return Err(io::Error::last_os_error());
    }

    // SAFETY: `socket` returned a fresh descriptor that we now own.
    let fd: OwnedFd = unsafe { OwnedFd::from_raw_fd(raw) };

    let mut address: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    address.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    address.nl_groups = CN_IDX_PROC;
    address.nl_pid = unsafe { libc::getpid() } as u32;

    let bound: libc::c_int = unsafe {
      libc::bind(
        fd.as_raw_fd(),
        (&raw const address).cast(),
        size_of::<libc::sockaddr_nl>() as libc::socklen_t,
      )
    };

    if bound < 0 {
      return Err(io::Error::last_os_error());
    }

    let request: McastRequest = McastRequest {
      header: libc::nlmsghdr {
        nlmsg_len: size_of::<McastRequest>() as u32,
        nlmsg_type: libc::NLMSG_DONE as u16,
        nlmsg_flags: 0,
        nlmsg_seq: 0,
        nlmsg_pid: unsafe { libc::getpid() } as u32,
      },
      body: CnMsgHeader {
        idx: CN_IDX_PROC,
        val: CN_VAL_PROC,
        seq: 0,
        ack: 0,
        len: size_of::<u32>() as u16,
        flags: 0,
      },
      op: PROC_CN_MCAST_LISTEN,
    };

    let sent: isize = ignore_eintr(|| {
      let sent: isize = unsafe {
        libc::send(
          fd.as_raw_fd(),
          (&raw const request).cast(),
          size_of::<McastRequest>(),
          0,
        )
      };

      if sent < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(sent)
      }
    })?;

    if sent as usize != size_of::<McastRequest>() {
      return Err(io::Error::from(io::ErrorKind::WriteZero));
    }

    Ok(Self { fd })
  }

  #[inline]
  pub(crate) fn raw(&self) -> RawFd {
    self.fd.as_raw_fd()
  }

  /// Drains pending notifications, one message per iteration while a
  /// zero-timeout poll reports more.
  ///
  /// Each decoded event that carries at least one lifecycle bit is passed
  /// to `visit` with the observed flags and payload.
  pub(crate) fn drain<F>(&self, mut visit: F)
  where
    F: FnMut(EventFlags, ProcessEvent),
  {
    while self.pending() {
      let Some((flags, event)) = self.receive() else {
        return;
      };

      if flags.is_empty() {
        // Subscription acknowledgements arrive as PROC_EVENT_NONE.
        continue;
      }

      visit(flags, event);
    }
  }

  fn pending(&self) -> bool {
    let mut probe: libc::pollfd = libc::pollfd {
      fd: self.fd.as_raw_fd(),
      events: libc::POLLIN,
      revents: 0,
    };

    let result: io::Result<bool> = ignore_eintr(|| {
      let ready: libc::c_int = unsafe { libc::poll(&mut probe, 1, 0) };

      if ready < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(ready > 0)
      }
    });

    result.unwrap_or(false)
  }

  fn receive(&self) -> Option<(EventFlags, ProcessEvent)> {
    let mut buffer: [u8; CAP_PROCESS_BUFFER] = [0; CAP_PROCESS_BUFFER];

    let length: isize = ignore_eintr(|| {
      let length: isize = unsafe {
        libc::recv(self.fd.as_raw_fd(), buffer.as_mut_ptr().cast(), buffer.len(), 0)
      };

      if length < 0 {
        Err(io::Error::last_os_error())
      } else {
        Ok(length)
      }
    })
    .ok()?;

    let payload: usize = NLMSG_HEADER + CN_MSG_HEADER;

    if (length as usize) < payload + size_of::<ProcEventRecord>() {
      return None;
    }

    // SAFETY: The length check above guarantees a complete record behind
    //         the netlink and connector headers. The record is read
    //         unaligned because the connector payload is only 4-aligned.
    let record: ProcEventRecord =
      unsafe { ptr::read_unaligned(buffer.as_ptr().add(payload).cast()) };

    let event: ProcessEvent = ProcessEvent {
      pid: record.pid,
      tgid: record.tgid,
      exit_code: record.exit_code,
      exit_signal: record.exit_signal,
    };

    Some((from_native_procflags(record.what), event))
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_procflags_bijection() {
    // The process group is six contiguous bits starting at EXEC_EVENT.
    for index in 0u32..64 {
      let flags: EventFlags = EventFlags::from_bits(index << 9).unwrap();

      assert!(EventFlags::PROCESS_GROUP.contains(flags));
      assert_eq!(from_native_procflags(to_native_procflags(flags)), flags);
    }
  }

  #[test]
  fn test_procflags_distinct() {
    for flag in EventFlags::PROCESS_GROUP.iter() {
      assert_eq!(to_native_procflags(flag).count_ones(), 1, "{flag:?}");
    }
  }

  #[test]
  fn test_exit_payload_layout() {
    // The exit status sits right behind the pid/tgid pair in every kernel
    // version this crate targets.
    assert_eq!(std::mem::offset_of!(ProcEventRecord, pid), 16);
    assert_eq!(std::mem::offset_of!(ProcEventRecord, exit_code), 24);
  }
}
