//! Slot allocator
//!
//! Issues and reclaims dense non-negative positions ("slots") for one
//! table's live entries.
//!
//! ## Responsibilities
//! - O(1) average allocate/free with no fragmentation above the high-water mark
//! - Smallest freed slot is always reissued first, keeping iteration dense
//! - Targeted reservation of a specific slot (used for aligned secondary claims)
//!
//! The allocator itself never fails; capacity limits are enforced by the
//! owning table.

use std::collections::BTreeSet;

/// Dense id space for one table's live entries.
///
/// Live slots are exactly `[0, high_water)` minus the free set. Freeing the
/// topmost slot lowers the high-water mark past any holes beneath it; holes
/// below the new top stay on the free set until reissued.
#[derive(Debug, Default, Clone)]
pub struct SlotAllocator {
    /// One past the highest slot ever handed out and not reclaimed from the top
    high_water: u32,

    /// Freed slots below the high-water mark, ordered so the smallest pops first
    free: BTreeSet<u32>,
}

impl SlotAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the smallest available slot
    pub fn allocate(&mut self) -> u32 {
        if let Some(&slot) = self.free.iter().next() {
            self.free.remove(&slot);
            return slot;
        }
        let slot = self.high_water;
        self.high_water += 1;
        slot
    }

    /// Allocate `count` consecutive slots from the high-water mark,
    /// returning the first.
    ///
    /// Skips the free set so the run is guaranteed contiguous.
    pub fn allocate_run(&mut self, count: u32) -> u32 {
        let first = self.high_water;
        self.high_water += count;
        first
    }

    /// Release a slot back to the allocator.
    ///
    /// Freeing the top slot lowers the high-water mark and absorbs any holes
    /// now exposed at the top, so `allocate_run` callers cannot strand them.
    /// Anything else becomes a hole on the free set. Out-of-range frees are
    /// ignored.
    pub fn free(&mut self, slot: u32) {
        if slot >= self.high_water {
            return;
        }
        if slot + 1 == self.high_water {
            self.high_water -= 1;
            while self.high_water > 0 && self.free.remove(&(self.high_water - 1)) {
                self.high_water -= 1;
            }
        } else {
            self.free.insert(slot);
        }
    }

    /// Claim a specific slot.
    ///
    /// Returns `true` when the slot was claimed: either it sat on the free
    /// set, or it lay at/above the high-water mark (the gap below it becomes
    /// holes). Returns `false` when the slot is already live; the caller
    /// decides whether to overwrite in place.
    pub fn reserve(&mut self, slot: u32) -> bool {
        if slot >= self.high_water {
            for gap in self.high_water..slot {
                self.free.insert(gap);
            }
            self.high_water = slot + 1;
            return true;
        }
        self.free.remove(&slot)
    }

    /// Whether a slot is currently allocated
    pub fn is_live(&self, slot: u32) -> bool {
        slot < self.high_water && !self.free.contains(&slot)
    }

    /// One past the highest live slot
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Number of holes below the high-water mark
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of live slots
    pub fn live(&self) -> usize {
        self.high_water as usize - self.free.len()
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.high_water = 0;
        self.free.clear();
    }
}
