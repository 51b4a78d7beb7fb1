//! Association fan-out
//!
//! ## Responsibilities
//! - Registering secondaries against a primary (the edge table records
//!   membership; the secondary records its primary and derivation)
//! - Projection: pushing every primary mutation into each secondary under
//!   the derived key, at the slot aligned with the primary's
//! - Retraction and reverse deletion: deleting through any table of an
//!   association group removes the aligned entries everywhere
//!
//! ## Alignment Invariant
//! ```text
//! primary entry at slot n  <=>  each secondary holds it at slot n
//! ```
//! For multi-value secondaries the aligned slot lives inside the derived
//! key's group table, which is why groups inherit the primary's mask.
//!
//! Fan-out is one level deep: a secondary's own secondaries are not
//! re-projected.

use bytes::Bytes;

use crate::assoc::{DeriveKey, Mirror};
use crate::error::{LatticeError, Result};

use super::{table_at, table_at_mut, Engine, Handle};

impl Engine {
    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `secondary` as a secondary of `primary`.
    ///
    /// `derive` picks the secondary key per projected entry; `None` selects
    /// the mirror derivation (secondary key = primary value). Re-registering
    /// an existing pairing just swaps the derivation.
    pub fn assoc(
        &mut self,
        secondary: Handle,
        primary: Handle,
        derive: Option<Box<dyn DeriveKey>>,
    ) -> Result<()> {
        if secondary == primary {
            return Err(LatticeError::AssocUnsupported(
                "a table cannot be its own secondary",
            ));
        }
        if self.table(primary)?.flags.multi_value {
            return Err(LatticeError::AssocUnsupported(
                "multi-value primaries have no per-entry position to align on",
            ));
        }
        if self.table(secondary)?.mask != self.table(primary)?.mask {
            return Err(LatticeError::AssocUnsupported(
                "primary and secondary capacity masks differ",
            ));
        }

        let previous = self.table(secondary)?.primary;
        if previous != Some(primary) {
            let edges = self.edges;
            if let Some(old) = previous {
                self.del_value(edges, &old.0.to_ne_bytes(), &secondary.0.to_ne_bytes())?;
            }
            self.raw_put(
                edges,
                &primary.0.to_ne_bytes(),
                &secondary.0.to_ne_bytes(),
                None,
            )?;
        }
        let table = table_at_mut(&mut self.tables, secondary)?;
        table.primary = Some(primary);
        table.derive = derive;
        tracing::debug!("table {} now secondary of {}", secondary.0, primary.0);
        Ok(())
    }

    /// Every registered secondary of `primary`, via the edge table
    pub(super) fn secondaries(&self, primary: Handle) -> Vec<Handle> {
        let Ok(edges) = self.table(self.edges) else {
            return Vec::new();
        };
        let Ok(Some(slot)) = edges.find(&self.registry, &primary.0.to_ne_bytes()) else {
            return Vec::new();
        };
        let Ok(group) = table_at(&self.tables, Handle(edges.value_handle(slot))) else {
            return Vec::new();
        };
        group
            .live_slots()
            .into_iter()
            .map(|slot| Handle(group.value_handle(slot)))
            .collect()
    }

    fn derived_key(&self, secondary: Handle, key: &[u8], value: &[u8]) -> Result<Bytes> {
        let table = table_at(&self.tables, secondary)?;
        Ok(match &table.derive {
            Some(derive) => derive.derive(key, value),
            None => Mirror.derive(key, value),
        })
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Push one committed primary entry into every secondary.
    ///
    /// `replaced` is the value an overwrite displaced; the key it derived
    /// is retracted first so a changed value never leaves a stale entry.
    pub(super) fn project(
        &mut self,
        primary: Handle,
        key: &[u8],
        value: &[u8],
        slot: u32,
        replaced: Option<&[u8]>,
    ) -> Result<()> {
        let secondaries = self.secondaries(primary);
        if secondaries.is_empty() {
            return Ok(());
        }
        for secondary in secondaries {
            let derived = self.derived_key(secondary, key, value)?;
            if let Some(old_value) = replaced {
                let old = self.derived_key(secondary, key, old_value)?;
                if old != derived {
                    self.retract(secondary, &old, slot)?;
                }
            }
            self.raw_put(secondary, &derived, key, Some(slot))?;
            tracing::trace!(
                "projected primary {} slot {} into secondary {}",
                primary.0,
                slot,
                secondary.0
            );
        }
        Ok(())
    }

    /// Remove the aligned entry a projection placed under `derived`
    fn retract(&mut self, secondary: Handle, derived: &[u8], slot: u32) -> Result<()> {
        let (multi, found) = {
            let table = table_at(&self.tables, secondary)?;
            (
                table.flags.multi_value,
                table.find(&self.registry, derived)?,
            )
        };
        let Some(outer_slot) = found else {
            return Ok(());
        };
        if multi {
            let group = Handle(self.table(secondary)?.value_handle(outer_slot));
            if table_at(&self.tables, group)?.slots.is_live(slot) {
                self.delete_group_member(group, slot)?;
            }
            return Ok(());
        }
        table_at_mut(&mut self.tables, secondary)?.remove_slot(outer_slot);
        Ok(())
    }

    // =========================================================================
    // Deletion Routing
    // =========================================================================

    /// Delete one entry of `hd`, wherever the association group replicates
    /// it.
    ///
    /// `inner` addresses a single member of a multimap group; `None` on a
    /// multimap takes the key's whole group. Secondaries route through
    /// their primary at the aligned slots so the entire group stays
    /// consistent.
    pub(super) fn delete_entry(
        &mut self,
        hd: Handle,
        outer_slot: u32,
        inner: Option<(Handle, u32)>,
    ) -> Result<()> {
        let (primary, multi) = {
            let table = self.table(hd)?;
            (table.primary, table.flags.multi_value)
        };

        if let Some(primary) = primary {
            let aligned: Vec<u32> = match inner {
                Some((_, slot)) => vec![slot],
                None if multi => {
                    let group = Handle(self.table(hd)?.value_handle(outer_slot));
                    table_at(&self.tables, group)?.live_slots()
                }
                None => vec![outer_slot],
            };
            for slot in aligned {
                self.delete_primary_slot(primary, slot)?;
            }

            // Entries whose primary slot was already gone are dropped
            // locally so the caller's delete always lands.
            match inner {
                Some((group, slot)) => {
                    let live = table_at(&self.tables, group)
                        .map(|g| g.slots.is_live(slot))
                        .unwrap_or(false);
                    if live {
                        self.delete_group_member(group, slot)?;
                    }
                }
                None if multi => {
                    if self.table(hd)?.slots.is_live(outer_slot) {
                        let group = Handle(self.table(hd)?.value_handle(outer_slot));
                        self.close_raw(group);
                        table_at_mut(&mut self.tables, hd)?.remove_slot(outer_slot);
                    }
                }
                None => {
                    if self.table(hd)?.slots.is_live(outer_slot) {
                        table_at_mut(&mut self.tables, hd)?.remove_slot(outer_slot);
                    }
                }
            }
            return Ok(());
        }

        match inner {
            Some((group, slot)) => self.delete_group_member(group, slot),
            None if multi => {
                let group = Handle(self.table(hd)?.value_handle(outer_slot));
                self.close_raw(group);
                table_at_mut(&mut self.tables, hd)?.remove_slot(outer_slot);
                Ok(())
            }
            None => {
                if self.secondaries(hd).is_empty() {
                    table_at_mut(&mut self.tables, hd)?.remove_slot(outer_slot);
                    Ok(())
                } else {
                    self.delete_primary_slot(hd, outer_slot)
                }
            }
        }
    }

    /// Delete one primary slot, retracting its projection from every
    /// secondary first. Dead slots are a no-op.
    fn delete_primary_slot(&mut self, primary: Handle, slot: u32) -> Result<()> {
        let (key, value) = {
            let table = table_at(&self.tables, primary)?;
            if !table.slots.is_live(slot) {
                return Ok(());
            }
            (table.key_bytes(slot), table.value_bytes(slot))
        };
        for secondary in self.secondaries(primary) {
            let derived = self.derived_key(secondary, &key, &value)?;
            self.retract(secondary, &derived, slot)?;
        }
        table_at_mut(&mut self.tables, primary)?.remove_slot(slot);
        tracing::trace!("deleted primary {} slot {}", primary.0, slot);
        Ok(())
    }

    /// Remove one member of a multimap group; the last member takes the
    /// group table and its owner's outer entry with it
    pub(super) fn delete_group_member(&mut self, group: Handle, slot: u32) -> Result<()> {
        let (empty, owner) = {
            let table = table_at_mut(&mut self.tables, group)?;
            table.remove_slot(slot);
            (table.len() == 0, table.owner)
        };
        if empty {
            self.close_raw(group);
            if let Some((outer, outer_slot)) = owner {
                if let Ok(table) = table_at_mut(&mut self.tables, outer) {
                    table.remove_slot(outer_slot);
                }
            }
        }
        Ok(())
    }
}
