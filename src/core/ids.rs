use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

/// Identity token proving a subscriber is still alive at delivery time.
///
/// Object IDs are 64-bit packed values that encode:
///
/// - **Index**: slot position in the anchor table (32 bits)
/// - **Serial**: reuse counter preventing collision with a recycled slot (32 bits)
///
/// The serial is bumped every time a slot is released, so an ID captured by
/// a pending delivery stops validating the moment its owner is destroyed,
/// even if the slot has since been handed to a new owner.
///
/// # Format
///
/// IDs display as `#OBJ<Index.Serial>`.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId {
  bits: u64,
}

impl ObjectId {
  /// Bit width of the slot index field.
  pub(crate) const INDEX_BITS: u32 = 32;

  /// Bitmask for extracting the slot index field.
  pub(crate) const INDEX_MASK: u64 = (1_u64 << Self::INDEX_BITS) - 1;

  /// Packs an index and serial into an ID.
  #[inline]
  pub(crate) const fn from_parts(index: u32, serial: u32) -> Self {
    Self {
      bits: ((serial as u64) << Self::INDEX_BITS) | index as u64,
    }
  }

  /// Creates an ID from its raw encoded bits.
  #[inline]
  pub const fn from_bits(bits: u64) -> Self {
    Self { bits }
  }

  /// Converts this ID into its raw encoded bits.
  #[inline]
  pub const fn into_bits(self) -> u64 {
    self.bits
  }

  /// Returns the slot index component.
  #[inline]
  pub(crate) const fn index(self) -> u32 {
    (self.bits & Self::INDEX_MASK) as u32
  }

  /// Returns the reuse serial component.
  #[inline]
  pub(crate) const fn serial(self) -> u32 {
    (self.bits >> Self::INDEX_BITS) as u32
  }
}

impl Debug for ObjectId {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Display::fmt(self, f)
  }
}

impl Display for ObjectId {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "#OBJ<{}.{}>", self.index(), self.serial())
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
