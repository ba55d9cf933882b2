use bitflags::bitflags;

bitflags! {
  /// Portable event vocabulary shared by every watch registration.
  ///
  /// Flags strictly below [`EXEC_EVENT`] describe descriptor readiness and
  /// filesystem path events; flags at [`EXEC_EVENT`] and above describe
  /// process lifecycle events. A single registration draws its flags from
  /// exactly one group - mixing the two is rejected at the registration
  /// boundary.
  ///
  /// Native flag constants (`EPOLL*`, `IN_*`, `PROC_EVENT_*`) never escape
  /// the backend; the rest of the crate speaks only this vocabulary.
  ///
  /// [`EXEC_EVENT`]: Self::EXEC_EVENT
  #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
  pub struct EventFlags: u32 {
    /// Error condition on the descriptor.
    const ERROR         = 1 << 0;
    /// Peer hung up or the descriptor was disconnected.
    const DISCONNECTED  = 1 << 1;
    /// Descriptor is readable.
    const READABLE      = 1 << 2;
    /// Descriptor is writable.
    const WRITABLE      = 1 << 3;
    /// Report state changes once instead of while the state holds.
    const EDGE_TRIGGER  = 1 << 4;
    /// Watched path was read from.
    const READ_EVENT    = 1 << 5;
    /// Watched path was written to.
    const WRITE_EVENT   = 1 << 6;
    /// Metadata of the watched path changed.
    const ATTRIBUTE_MOD = 1 << 7;
    /// The watched path itself was moved.
    const MOVED         = 1 << 8;
    /// Watched process called `exec`.
    const EXEC_EVENT    = 1 << 9;
    /// Watched process exited.
    const EXIT_EVENT    = 1 << 10;
    /// Watched process forked.
    const FORK_EVENT    = 1 << 11;
    /// Watched process changed its user ID.
    const UID_EVENT     = 1 << 12;
    /// Watched process changed its group ID.
    const GID_EVENT     = 1 << 13;
    /// Watched process changed its session ID.
    const SID_EVENT     = 1 << 14;
  }
}

impl EventFlags {
  /// Flags accepted by a descriptor registration.
  pub const DESCRIPTOR_GROUP: Self = Self::ERROR
    .union(Self::DISCONNECTED)
    .union(Self::READABLE)
    .union(Self::WRITABLE)
    .union(Self::EDGE_TRIGGER);

  /// Flags accepted by a path watch.
  pub const PATH_GROUP: Self = Self::READ_EVENT
    .union(Self::WRITE_EVENT)
    .union(Self::ATTRIBUTE_MOD)
    .union(Self::MOVED);

  /// Flags accepted by a process watch.
  pub const PROCESS_GROUP: Self = Self::EXEC_EVENT
    .union(Self::EXIT_EVENT)
    .union(Self::FORK_EVENT)
    .union(Self::UID_EVENT)
    .union(Self::GID_EVENT)
    .union(Self::SID_EVENT);

  /// Returns `true` if any process-group flag is set.
  #[inline]
  pub const fn is_process(self) -> bool {
    self.intersects(Self::PROCESS_GROUP)
  }

  /// Returns `true` if the set is non-empty and drawn entirely from `group`.
  #[inline]
  pub const fn is_within(self, group: Self) -> bool {
    !self.is_empty() && group.contains(self)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
