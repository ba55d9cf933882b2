//! Runtime configuration constants and default values.
//!
//! These constants control buffer sizing for the OS-event backend and the
//! initial capacities of the core data structures. Capacities marked `CAP_`
//! are starting sizes; the structures grow as needed.

// -----------------------------------------------------------------------------
// Exit Codes
// -----------------------------------------------------------------------------

/// Exit code returned by a loop that terminated cleanly.
pub const E_CODE_SUCCESS: i32 = 0;

// -----------------------------------------------------------------------------
// Backend Buffers
// -----------------------------------------------------------------------------

/// Maximum number of ready entries accepted from one poll wakeup.
pub const CAP_POLL_EVENTS: usize = 2048;

/// Size of the path-watcher drain buffer in bytes.
///
/// One path record is at most 16 header bytes plus a NUL-terminated name of
/// up to `NAME_MAX` (255) bytes; the buffer holds a batch of sixteen
/// worst-case records per drain.
pub const CAP_PATH_BUFFER: usize = (16 + 255 + 1) * 16;

/// Size of the process-event receive buffer in bytes.
///
/// Process-connector datagrams are small (well under 100 bytes); one
/// message is received per iteration.
pub const CAP_PROCESS_BUFFER: usize = 256;

// -----------------------------------------------------------------------------
// Memory Allocation
// -----------------------------------------------------------------------------

/// Initial capacity of the dispatch queue.
pub const CAP_QUEUE_BUFFER: usize = 64;

/// Initial capacity of the subscriber identity table.
pub const CAP_ANCHOR_SLOTS: usize = 64;
