use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use triomphe::Arc as TArc;

use crate::core::AnchorTable;
use crate::core::ObjectId;

/// A live subscriber identity.
///
/// An anchor holds one slot in the runtime's identity table for as long as
/// it exists; dropping it invalidates the [`ObjectId`] it minted, which
/// turns every pending delivery addressed to it into a silent no-op.
///
/// Anchors are deliberately not `Clone`: one identity, one owner. They may
/// be moved freely - the identity lives in the table, not at the anchor's
/// address.
pub struct Anchor {
  table: TArc<AnchorTable>,
  id: ObjectId,
}

impl Anchor {
  pub(crate) fn acquire(table: &TArc<AnchorTable>) -> Self {
    let id: ObjectId = table.acquire();

    tracing::trace!(%id, live = table.len(), "anchor acquired");

    Self {
      table: TArc::clone(table),
      id,
    }
  }

  /// Returns the identity this anchor keeps alive.
  #[inline]
  pub fn id(&self) -> ObjectId {
    self.id
  }
}

impl Drop for Anchor {
  fn drop(&mut self) {
    self.table.release(self.id);
    tracing::trace!(id = %self.id, "anchor released");
  }
}

impl Debug for Anchor {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_tuple("Anchor").field(&self.id).finish()
  }
}
