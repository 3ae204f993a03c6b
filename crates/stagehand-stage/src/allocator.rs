//! Per-stage object identifier pool.
//!
//! A stage has 127 reusable slots numbered `1..=127`. Allocation always
//! takes the highest free slot, which is the order clients have been
//! observed to expect. Slot `0` is never handed out.

use stagehand_protocol::{CharId, ObjectId};

/// Highest slot number.
pub const MAX_SLOT: u8 = 0x7f;

/// Bounded pool of object slots, each remembering its owner.
#[derive(Debug, Clone)]
pub struct ObjectIdAllocator {
    owners: [Option<CharId>; MAX_SLOT as usize + 1],
}

impl Default for ObjectIdAllocator {
    fn default() -> Self {
        Self {
            owners: [None; MAX_SLOT as usize + 1],
        }
    }
}

impl ObjectIdAllocator {
    /// Creates a pool with every slot free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the highest free slot for `owner`.
    ///
    /// Returns `None` when all 127 slots are in use.
    pub fn allocate(&mut self, owner: CharId) -> Option<ObjectId> {
        let slot = (1..=MAX_SLOT).rev().find(|s| self.owners[*s as usize].is_none())?;
        self.owners[slot as usize] = Some(owner);
        Some(ObjectId::from_slot(slot))
    }

    /// Frees the slot behind `id`. Returns `true` if it was in use.
    pub fn release(&mut self, id: ObjectId) -> bool {
        let slot = id.slot();
        if slot == 0 || slot > MAX_SLOT {
            return false;
        }
        self.owners[slot as usize].take().is_some()
    }

    /// Frees every slot held by `owner`. Returns how many were freed.
    pub fn release_owner(&mut self, owner: CharId) -> usize {
        let mut freed = 0;
        for entry in self.owners.iter_mut().filter(|o| **o == Some(owner)) {
            *entry = None;
            freed += 1;
        }
        freed
    }

    /// Owner of the slot behind `id`, if allocated.
    pub fn owner(&self, id: ObjectId) -> Option<CharId> {
        self.owners.get(id.slot() as usize).copied().flatten()
    }

    /// Number of slots in use.
    pub fn in_use(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }
}
