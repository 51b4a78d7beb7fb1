//! Mutation and lookup operations
//!
//! ## Responsibilities
//! - put/push/get/del/del_value/clear over validated handles
//! - Multimap routing: lazily opening per-key group tables and descending
//!   into them
//! - Many-to-many routing: encoding user pairs into the compound primary
//!   key and answering bare-key reads through the key-side index
//!
//! Association fan-out (projection, retraction, deletion routing) lives in
//! the sibling `assoc` module; every mutation here hands it the committed
//! position.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::{LatticeError, Result};
use crate::table::{PutOutcome, TableFlags};
use crate::types::{encode_pair, split_pair, TypeId};

use super::{table_at, table_at_mut, Engine, Handle};

impl Engine {
    // =========================================================================
    // Put
    // =========================================================================

    /// Insert or overwrite one entry, returning the position used.
    ///
    /// Multimaps append the value to the key's group. Many-to-many
    /// primaries treat `(key, value)` as the pair identity.
    pub fn put(&mut self, hd: Handle, key: &[u8], value: &[u8]) -> Result<u32> {
        if self.table(hd)?.pair.is_some() {
            let encoded = encode_pair(key, value);
            return self.internal_put(hd, &encoded, value);
        }
        self.internal_put(hd, key, value)
    }

    /// Auto-index insert: the engine picks the smallest free slot and uses
    /// it as the key
    pub fn push(&mut self, hd: Handle, value: &[u8]) -> Result<u32> {
        if !self.table(hd)?.flags.auto_index {
            return Err(LatticeError::AutoIndexRequired);
        }
        let slot = table_at_mut(&mut self.tables, hd)?.push(value)?;
        tracing::trace!("table {} push -> slot {}", hd.0, slot);
        self.project(hd, &slot.to_ne_bytes(), value, slot, None)?;
        Ok(slot)
    }

    /// Commit locally, then fan the mutation out to registered secondaries
    fn internal_put(&mut self, hd: Handle, key: &[u8], value: &[u8]) -> Result<u32> {
        let outcome = self.raw_put(hd, key, value, None)?;
        let replaced = outcome.replaced.clone();
        self.project(hd, key, value, outcome.slot, replaced.as_deref())?;
        Ok(outcome.slot)
    }

    /// Association-blind put. `at` claims an aligned slot for projections.
    pub(super) fn raw_put(
        &mut self,
        hd: Handle,
        key: &[u8],
        value: &[u8],
        at: Option<u32>,
    ) -> Result<PutOutcome> {
        if !self.table(hd)?.flags.multi_value {
            let outcome = {
                let table = table_at_mut(&mut self.tables, hd)?;
                table.put(&self.registry, key, value, at)?
            };
            tracing::trace!("table {} put -> slot {}", hd.0, outcome.slot);
            return Ok(outcome);
        }

        // Multimap: route the value into the key's nested group
        let existing = self.table(hd)?.find(&self.registry, key)?;
        let (outer_slot, group, fresh) = match existing {
            Some(slot) => (slot, Handle(self.table(hd)?.value_handle(slot)), false),
            None => {
                let group = self.open_group(hd)?;
                let linked = {
                    let table = table_at_mut(&mut self.tables, hd)?;
                    table.put(&self.registry, key, &group.0.to_ne_bytes(), None)
                };
                let outer_slot = match linked {
                    Ok(outcome) => outcome.slot,
                    Err(err) => {
                        self.close_raw(group);
                        return Err(err);
                    }
                };
                table_at_mut(&mut self.tables, group)?.owner = Some((hd, outer_slot));
                (outer_slot, group, true)
            }
        };

        let inner = {
            let table = table_at_mut(&mut self.tables, group)?;
            match at {
                // Aligned claim: the group slot mirrors the primary's slot
                Some(slot) => table
                    .put(&self.registry, &slot.to_ne_bytes(), value, None)
                    .map(|outcome| outcome.slot),
                None => table.push(value),
            }
        };
        match inner {
            Ok(slot) => {
                tracing::trace!(
                    "table {} put -> group {} slot {}",
                    hd.0,
                    group.0,
                    slot
                );
                Ok(PutOutcome {
                    slot: outer_slot,
                    replaced: None,
                })
            }
            Err(err) => {
                if fresh {
                    self.close_raw(group);
                    table_at_mut(&mut self.tables, hd)?.remove_slot(outer_slot);
                }
                Err(err)
            }
        }
    }

    /// Open the private auto-indexed group table backing one multimap key.
    ///
    /// Groups inherit the outer mask so aligned claims always fit.
    fn open_group(&mut self, outer: Handle) -> Result<Handle> {
        let (value_type, mask) = {
            let table = self.table(outer)?;
            (table.value_type, table.mask)
        };
        let flags = TableFlags {
            auto_index: true,
            ..Default::default()
        };
        let group = self.open_raw(TypeId::HANDLE, value_type, mask, flags)?;
        tracing::debug!("table {} grew group table {}", outer.0, group.0);
        Ok(group)
    }

    // =========================================================================
    // Get
    // =========================================================================

    /// Look up one value; multimaps answer with the key's first live value.
    ///
    /// A miss is `None`, never an error.
    pub fn get(&self, hd: Handle, key: &[u8]) -> Result<Option<Bytes>> {
        let table = self.table(hd)?;

        // Many-to-many primaries answer bare keys through the key-side index
        if table.pair.is_some() {
            let key_index = table
                .partners
                .get(1)
                .copied()
                .ok_or(LatticeError::InvalidHandle(hd.0))?;
            return Ok(self.get(key_index, key)?.and_then(|compound| {
                split_pair(&compound).map(|(_, tail)| Bytes::copy_from_slice(tail))
            }));
        }

        let Some(slot) = table.find(&self.registry, key)? else {
            return Ok(None);
        };
        if table.flags.multi_value {
            let group = Handle(table.value_handle(slot));
            return match table_at(&self.tables, group)?.next_live(0) {
                Some(inner) => Ok(Some(self.value_of(hd, group, inner)?)),
                None => Ok(None),
            };
        }
        Ok(Some(self.value_of(hd, hd, slot)?))
    }

    /// The value at a slot, honoring primary-key-get redirection.
    ///
    /// `logical` is the table the caller addressed; `physical` is where the
    /// slot lives (a group table for multimap entries).
    pub(super) fn value_of(&self, logical: Handle, physical: Handle, slot: u32) -> Result<Bytes> {
        let table = table_at(&self.tables, logical)?;
        if table.flags.primary_key_get {
            if let Some(primary) = table.primary {
                return Ok(table_at(&self.tables, primary)?.key_bytes(slot));
            }
        }
        Ok(table_at(&self.tables, physical)?.value_bytes(slot))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove every entry for a key. Missing keys are a silent no-op.
    pub fn del(&mut self, hd: Handle, key: &[u8]) -> Result<()> {
        let table = self.table(hd)?;
        if table.pair.is_some() {
            let key_index = table
                .partners
                .get(1)
                .copied()
                .ok_or(LatticeError::InvalidHandle(hd.0))?;
            return self.del(key_index, key);
        }
        match table.find(&self.registry, key)? {
            Some(slot) => self.delete_entry(hd, slot, None),
            None => Ok(()),
        }
    }

    /// Remove only the byte-matching entry for a key. On many-to-many
    /// primaries `(key, value)` addresses the pair itself.
    pub fn del_value(&mut self, hd: Handle, key: &[u8], value: &[u8]) -> Result<()> {
        let table = self.table(hd)?;

        if table.pair.is_some() {
            let encoded = encode_pair(key, value);
            return match table.find(&self.registry, &encoded)? {
                Some(slot) => self.delete_entry(hd, slot, None),
                None => Ok(()),
            };
        }

        let value_type = table.value_type;
        let Some(outer_slot) = table.find(&self.registry, key)? else {
            return Ok(());
        };

        if table.flags.multi_value {
            let group = Handle(table.value_handle(outer_slot));
            let mut next = table_at(&self.tables, group)?.next_live(0);
            while let Some(slot) = next {
                let stored = self.value_of(hd, group, slot)?;
                if self.registry.compare(value_type, &stored, value)? == Ordering::Equal {
                    return self.delete_entry(hd, outer_slot, Some((group, slot)));
                }
                next = table_at(&self.tables, group)?.next_live(slot + 1);
            }
            return Ok(());
        }

        let stored = self.value_of(hd, hd, outer_slot)?;
        if self.registry.compare(value_type, &stored, value)? == Ordering::Equal {
            self.delete_entry(hd, outer_slot, None)?;
        }
        Ok(())
    }

    /// Delete every live entry; the table stays open and empty
    pub fn clear(&mut self, hd: Handle) -> Result<()> {
        // Standalone single-value tables have nothing to fan out, so the
        // whole table drops in one pass instead of entry by entry.
        let standalone = {
            let table = self.table(hd)?;
            !table.flags.multi_value && table.primary.is_none()
        };
        if standalone && self.secondaries(hd).is_empty() {
            table_at_mut(&mut self.tables, hd)?.clear_entries();
            tracing::debug!("cleared table {}", hd.0);
            return Ok(());
        }
        while let Some(slot) = self.table(hd)?.next_live(0) {
            self.delete_entry(hd, slot, None)?;
        }
        tracing::debug!("cleared table {}", hd.0);
        Ok(())
    }
}
