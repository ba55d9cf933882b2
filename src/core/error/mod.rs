//! Error handling utilities for registration and system errors.

mod macros;

pub(crate) use self::macros::fatal;

use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;

use crate::core::EventFlags;

// -----------------------------------------------------------------------------
// Flag Group Error
// -----------------------------------------------------------------------------

/// A registration passed flags outside the group its operation accepts.
///
/// Descriptor registrations accept the descriptor group, path watches the
/// path group, and process watches the process group; an empty set or a set
/// that mixes groups is ill-formed.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct FlagGroupError {
  given: EventFlags,
  group: EventFlags,
}

impl FlagGroupError {
  #[inline]
  pub(crate) const fn new(given: EventFlags, group: EventFlags) -> Self {
    Self { given, group }
  }

  /// Returns the flags the caller passed.
  #[inline]
  pub const fn given(&self) -> EventFlags {
    self.given
  }
}

impl Debug for FlagGroupError {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Display::fmt(self, f)
  }
}

impl Display for FlagGroupError {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(
      f,
      "flags {:?} are not drawn from the accepted group {:?}",
      self.given, self.group,
    )
  }
}

impl Error for FlagGroupError {}

impl From<FlagGroupError> for io::Error {
  #[inline]
  fn from(other: FlagGroupError) -> Self {
    io::Error::new(io::ErrorKind::InvalidInput, other)
  }
}

/// Checks that `flags` is a non-empty subset of `group`.
#[inline]
pub(crate) fn check_group(flags: EventFlags, group: EventFlags) -> Result<(), FlagGroupError> {
  if flags.is_within(group) {
    Ok(())
  } else {
    Err(FlagGroupError::new(flags, group))
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
