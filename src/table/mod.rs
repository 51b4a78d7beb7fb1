//! Table core
//!
//! One hash-addressed associative collection: a bucket placement array maps
//! hash-derived bucket ids to dense slots, an inverse array maps slots back
//! to buckets, and two [`MemberStore`]s hold key and value data per slot.
//!
//! ## Responsibilities
//! - Linear-probed placement with tombstone reuse and key equality checks
//! - Dense, position-stable slots drawn from the table's own [`SlotAllocator`]
//! - Aligned claims of specific slots for the association subsystem
//! - In-place overwrite for fixed members, move-on-overwrite for heap members
//!
//! ## Placement Invariant
//! ```text
//! for every live slot n:   buckets[inverse[n]] == Occupied(n)
//! ```
//! The inverse entry of a dead slot goes stale; liveness always comes from
//! the slot allocator.
//!
//! Association wiring (primary link, derive callback, partners) is stored
//! here but orchestrated by the engine.

mod member;

pub(crate) use member::MemberStore;

use std::cmp::Ordering;

use bytes::Bytes;

use crate::alloc::SlotAllocator;
use crate::assoc::DeriveKey;
use crate::engine::Handle;
use crate::error::{LatticeError, Result};
use crate::types::{TypeId, TypeRegistry};

// =============================================================================
// Flags and Placement
// =============================================================================

/// Behavior flags for one table
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TableFlags {
    /// Absent keys draw a dense integer slot and use it as the key
    pub auto_index: bool,

    /// Value cells hold handles of nested per-key group tables
    pub multi_value: bool,

    /// Value reads redirect to the primary's key at the aligned slot
    pub primary_key_get: bool,
}

/// One cell of the placement array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Empty,
    /// A key lived here once; probe chains pass through
    Tombstone,
    Occupied(u32),
}

/// Outcome of probing for a key
pub(crate) enum Probe {
    /// Key is present at this slot
    Found { slot: u32 },
    /// Key is absent; this bucket is where it would go
    Vacant { bucket: usize },
    /// Every bucket is occupied by other keys
    Full,
}

/// Result of a put: the slot used, and the previous value when an existing
/// entry was overwritten
pub(crate) struct PutOutcome {
    pub slot: u32,
    pub replaced: Option<Bytes>,
}

// =============================================================================
// Table
// =============================================================================

/// One associative collection: placement, inverse, members, slot allocator
pub(crate) struct Table {
    pub key_type: TypeId,
    pub value_type: TypeId,

    /// Capacity is `mask + 1`, a power of two fixed at open time
    pub mask: u32,
    pub flags: TableFlags,

    /// bucket id -> slot
    buckets: Vec<Bucket>,
    /// slot -> bucket id; stale for dead slots
    inverse: Vec<u32>,

    keys: MemberStore,
    values: MemberStore,
    pub slots: SlotAllocator,

    /// Fixed 4-byte keys place by their own value instead of a content hash
    identity: bool,

    // -------------------------------------------------------------------------
    // Association wiring (engine-managed)
    // -------------------------------------------------------------------------
    /// Primary this table is a secondary of
    pub primary: Option<Handle>,

    /// Secondary-key derivation; `None` selects the mirror derivation
    pub derive: Option<Box<dyn DeriveKey>>,

    /// Tables opened alongside this one (TWO_WAY), closed with it
    pub partners: Vec<Handle>,

    /// For nested group tables: the outer table and the slot pointing here
    pub owner: Option<(Handle, u32)>,

    /// For many-to-many primaries: the compound key type puts encode into
    pub pair: Option<TypeId>,
}

impl Table {
    /// Build a table. Widths come pre-resolved from the registry so
    /// construction itself cannot fail.
    pub fn new(
        key_type: TypeId,
        value_type: TypeId,
        mask: u32,
        flags: TableFlags,
        key_width: Option<usize>,
        value_width: Option<usize>,
    ) -> Self {
        let keys = match key_width {
            Some(width) => MemberStore::fixed(width),
            None => MemberStore::heap(),
        };
        // Multi-value tables store nested group handles, never raw values
        let values = if flags.multi_value {
            MemberStore::fixed(4)
        } else {
            match value_width {
                Some(width) => MemberStore::fixed(width),
                None => MemberStore::heap(),
            }
        };

        let capacity = mask as usize + 1;
        Self {
            key_type,
            value_type,
            mask,
            flags,
            buckets: vec![Bucket::Empty; capacity],
            inverse: Vec::new(),
            keys,
            values,
            slots: SlotAllocator::new(),
            identity: key_width == Some(4),
            primary: None,
            derive: None,
            partners: Vec::new(),
            owner: None,
            pair: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    pub fn len(&self) -> usize {
        self.slots.live()
    }

    pub fn key_at(&self, slot: u32) -> &[u8] {
        self.keys.read(slot)
    }

    pub fn key_bytes(&self, slot: u32) -> Bytes {
        self.keys.read_bytes(slot)
    }

    pub fn value_bytes(&self, slot: u32) -> Bytes {
        self.values.read_bytes(slot)
    }

    /// Value cell interpreted as a table handle (multi-value tables)
    pub fn value_handle(&self, slot: u32) -> u32 {
        let raw = self.values.read(slot);
        match <[u8; 4]>::try_from(raw) {
            Ok(bytes) => u32::from_ne_bytes(bytes),
            Err(_) => u32::MAX,
        }
    }

    /// First live slot at or after `from`
    pub fn next_live(&self, from: u32) -> Option<u32> {
        (from..self.slots.high_water()).find(|&slot| self.slots.is_live(slot))
    }

    /// Every live slot, ascending
    pub fn live_slots(&self) -> Vec<u32> {
        (0..self.slots.high_water())
            .filter(|&slot| self.slots.is_live(slot))
            .collect()
    }

    // =========================================================================
    // Placement
    // =========================================================================

    fn hash(&self, key: &[u8]) -> u32 {
        if self.identity {
            if let Ok(bytes) = <[u8; 4]>::try_from(key) {
                return u32::from_ne_bytes(bytes);
            }
        }
        crc32fast::hash(key)
    }

    /// Locate a key: its slot, the bucket it would occupy, or table-full.
    ///
    /// Linear probing with tombstone reuse; the scan stops at the first
    /// empty bucket, so deletions must tombstone rather than empty.
    pub fn probe(&self, registry: &TypeRegistry, key: &[u8]) -> Result<Probe> {
        if self.flags.auto_index {
            // Identity placement: bucket == slot == key
            let slot = slot_from_key(key)?;
            if slot > self.mask {
                return Ok(Probe::Full);
            }
            if self.slots.is_live(slot) {
                return Ok(Probe::Found { slot });
            }
            return Ok(Probe::Vacant {
                bucket: slot as usize,
            });
        }

        let start = (self.hash(key) & self.mask) as usize;
        let mut tombstone = None;
        for step in 0..self.capacity() {
            let bucket = (start + step) & self.mask as usize;
            match self.buckets[bucket] {
                Bucket::Empty => {
                    return Ok(Probe::Vacant {
                        bucket: tombstone.unwrap_or(bucket),
                    })
                }
                Bucket::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(bucket);
                    }
                }
                Bucket::Occupied(slot) => {
                    if registry.compare(self.key_type, self.key_at(slot), key)? == Ordering::Equal {
                        return Ok(Probe::Found { slot });
                    }
                }
            }
        }
        Ok(match tombstone {
            Some(bucket) => Probe::Vacant { bucket },
            None => Probe::Full,
        })
    }

    /// Slot of a key, if present
    pub fn find(&self, registry: &TypeRegistry, key: &[u8]) -> Result<Option<u32>> {
        Ok(match self.probe(registry, key)? {
            Probe::Found { slot } => Some(slot),
            _ => None,
        })
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert or overwrite one entry.
    ///
    /// `at` claims a specific slot for new entries (aligned secondary
    /// projection); existing keys always keep their slot.
    pub fn put(
        &mut self,
        registry: &TypeRegistry,
        key: &[u8],
        value: &[u8],
        at: Option<u32>,
    ) -> Result<PutOutcome> {
        self.check_key_width(key)?;
        self.check_value_width(value)?;

        match self.probe(registry, key)? {
            Probe::Found { slot } => {
                let replaced = self.values.read_bytes(slot);
                self.values.write(slot, value);
                Ok(PutOutcome {
                    slot,
                    replaced: Some(replaced),
                })
            }
            Probe::Vacant { bucket } => {
                let slot = match at {
                    Some(n) => {
                        if !self.slots.reserve(n) {
                            // Aligned claims are authoritative: evict whatever
                            // holds the slot, then take it.
                            self.remove_slot(n);
                            self.slots.reserve(n);
                        }
                        n
                    }
                    None if self.flags.auto_index => {
                        let slot = slot_from_key(key)?;
                        self.slots.reserve(slot);
                        slot
                    }
                    None => self.slots.allocate(),
                };
                if slot > self.mask {
                    self.slots.free(slot);
                    tracing::warn!("put refused, {} slots in use", self.capacity());
                    return Err(LatticeError::CapacityExceeded {
                        capacity: self.capacity(),
                    });
                }
                self.link(bucket, slot, key, value);
                Ok(PutOutcome {
                    slot,
                    replaced: None,
                })
            }
            Probe::Full => {
                tracing::warn!("put refused, all {} buckets occupied", self.capacity());
                Err(LatticeError::CapacityExceeded {
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Auto-index insert: the allocated slot is the key
    pub fn push(&mut self, value: &[u8]) -> Result<u32> {
        self.check_value_width(value)?;
        let slot = self.slots.allocate();
        if slot > self.mask {
            self.slots.free(slot);
            tracing::warn!("push refused, {} slots in use", self.capacity());
            return Err(LatticeError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        let key = slot.to_ne_bytes();
        self.link(slot as usize, slot, &key, value);
        Ok(slot)
    }

    fn link(&mut self, bucket: usize, slot: u32, key: &[u8], value: &[u8]) {
        self.keys.write(slot, key);
        self.values.write(slot, value);
        self.buckets[bucket] = Bucket::Occupied(slot);
        let index = slot as usize;
        if self.inverse.len() <= index {
            self.inverse.resize(index + 1, u32::MAX);
        }
        self.inverse[index] = bucket as u32;
    }

    /// Delete one live slot: tombstone its bucket, drop member payloads,
    /// release the slot. No-op for dead slots.
    pub fn remove_slot(&mut self, slot: u32) {
        if !self.slots.is_live(slot) {
            return;
        }
        if let Some(&bucket) = self.inverse.get(slot as usize) {
            if let Some(cell) = self.buckets.get_mut(bucket as usize) {
                if *cell == Bucket::Occupied(slot) {
                    *cell = Bucket::Tombstone;
                }
            }
            self.inverse[slot as usize] = u32::MAX;
        }
        self.keys.clear_slot(slot);
        self.values.clear_slot(slot);
        self.slots.free(slot);
    }

    /// Drop every entry at once: empty the placement array, both member
    /// stores, and the slot allocator.
    ///
    /// Only valid for tables with no association wiring; entries replicated
    /// elsewhere must be deleted one by one so the retractions fan out.
    pub fn clear_entries(&mut self) {
        self.buckets.fill(Bucket::Empty);
        self.inverse.clear();
        self.keys.reset();
        self.values.reset();
        self.slots.reset();
    }

    // =========================================================================
    // Width Checks
    // =========================================================================

    fn check_key_width(&self, key: &[u8]) -> Result<()> {
        if self.flags.auto_index {
            slot_from_key(key)?;
            return Ok(());
        }
        check_width(self.keys.width(), key)
    }

    fn check_value_width(&self, value: &[u8]) -> Result<()> {
        // Multi-value tables check the outer value (a group handle) here;
        // the real value is checked by the group table.
        check_width(self.values.width(), value)
    }
}

fn check_width(expected: Option<usize>, datum: &[u8]) -> Result<()> {
    match expected {
        Some(width) if width != datum.len() => Err(LatticeError::WidthMismatch {
            expected: width,
            actual: datum.len(),
        }),
        _ => Ok(()),
    }
}

/// Auto-index keys are the slot itself, as a native-endian u32
fn slot_from_key(key: &[u8]) -> Result<u32> {
    <[u8; 4]>::try_from(key)
        .map(u32::from_ne_bytes)
        .map_err(|_| LatticeError::WidthMismatch {
            expected: 4,
            actual: key.len(),
        })
}
