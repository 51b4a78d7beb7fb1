//! Cursor operations
//!
//! ## Responsibilities
//! - Opening cursors (full scan or anchored to one key) from the bounded
//!   pool
//! - Advancing: slot-order scan of the outer table, descending one level
//!   into multimap groups
//! - Cursor-relative deletion of the last yielded entry
//!
//! A cursor that runs out of entries releases itself; `finish` is for
//! abandoning iteration early.

use bytes::Bytes;

use crate::cursor::{Cursor, CursorId, Entry, Frame, Position};
use crate::error::{LatticeError, Result};

use super::{table_at, Engine, Handle, MAX_CURSORS};

impl Engine {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a cursor over `hd`. With an anchor key the cursor yields only
    /// that key's entries (every group member for a multimap key); without
    /// one it walks the whole table in slot order.
    pub fn iterate(&mut self, hd: Handle, anchor: Option<&[u8]>) -> Result<CursorId> {
        let outer = match anchor {
            Some(key) => match self.table(hd)?.find(&self.registry, key)? {
                Some(slot) => Frame::anchored(hd, slot, Bytes::copy_from_slice(key)),
                None => Frame::drained(hd),
            },
            None => {
                self.table(hd)?;
                Frame::scan(hd)
            }
        };

        let raw = self.cursor_ids.allocate();
        if raw as usize >= MAX_CURSORS {
            self.cursor_ids.free(raw);
            return Err(LatticeError::CursorExhausted(MAX_CURSORS));
        }
        let index = raw as usize;
        if self.cursors.len() <= index {
            self.cursors.resize_with(index + 1, || None);
        }
        self.cursors[index] = Some(Cursor::new(hd, outer));
        tracing::trace!("opened cursor {} over table {}", raw, hd.0);
        Ok(CursorId(raw))
    }

    /// Abandon a cursor before exhaustion
    pub fn finish(&mut self, cur: CursorId) -> Result<()> {
        let taken = self
            .cursors
            .get_mut(cur.0 as usize)
            .and_then(|slot| slot.take());
        if taken.is_none() {
            return Err(LatticeError::InvalidCursor(cur.0));
        }
        self.cursor_ids.free(cur.0);
        tracing::trace!("finished cursor {}", cur.0);
        Ok(())
    }

    /// Return an exhausted cursor to the pool
    fn release(&mut self, cur: CursorId) {
        if let Some(slot) = self.cursors.get_mut(cur.0 as usize) {
            if slot.take().is_some() {
                self.cursor_ids.free(cur.0);
            }
        }
    }

    // =========================================================================
    // Advancing
    // =========================================================================

    /// Next entry, or `None` once the cursor is exhausted (which releases
    /// it; the id is invalid afterwards).
    pub fn advance(&mut self, cur: CursorId) -> Result<Option<Entry>> {
        loop {
            let (table, outer, outer_current, inner) = {
                let cursor = cursor_at(&self.cursors, cur)?;
                (
                    cursor.table,
                    cursor.outer.clone(),
                    cursor.outer_current,
                    cursor.inner.clone(),
                )
            };

            // Drain the current group before moving the outer frame
            if let (Some(frame), Some(outer_slot)) = (inner, outer_current) {
                let group = frame.handle;
                let next = table_at(&self.tables, group)
                    .ok()
                    .and_then(|g| g.next_live(frame.next_slot));
                match next {
                    Some(slot) => {
                        let key = table_at(&self.tables, table)?.key_bytes(outer_slot);
                        let value = self.value_of(table, group, slot)?;
                        let cursor = cursor_at_mut(&mut self.cursors, cur)?;
                        if let Some(frame) = cursor.inner.as_mut() {
                            frame.next_slot = slot + 1;
                        }
                        cursor.current = Some(Position {
                            outer_slot,
                            inner: Some((group, slot)),
                            key: key.clone(),
                        });
                        return Ok(Some(Entry {
                            key,
                            value,
                            position: slot,
                        }));
                    }
                    None => {
                        let cursor = cursor_at_mut(&mut self.cursors, cur)?;
                        cursor.inner = None;
                        cursor.outer_current = None;
                        continue;
                    }
                }
            }

            if outer.drained {
                self.release(cur);
                return Ok(None);
            }
            let next = {
                let outer_table = table_at(&self.tables, table)?;
                match outer.anchor {
                    // Anchored cursors visit one slot, and only while it
                    // still holds the anchor key (the slot may have been
                    // freed and reissued to another key since resolution)
                    Some((slot, ref key)) => {
                        let held = outer_table.slots.is_live(slot)
                            && outer_table.key_at(slot) == &key[..];
                        held.then_some(slot)
                    }
                    None => outer_table.next_live(outer.next_slot),
                }
            };
            let Some(slot) = next else {
                self.release(cur);
                return Ok(None);
            };

            if table_at(&self.tables, table)?.flags.multi_value {
                let group = Handle(table_at(&self.tables, table)?.value_handle(slot));
                let cursor = cursor_at_mut(&mut self.cursors, cur)?;
                cursor.outer.next_slot = slot + 1;
                if cursor.outer.anchor.is_some() {
                    cursor.outer.drained = true;
                }
                cursor.outer_current = Some(slot);
                cursor.inner = Some(Frame::scan(group));
                continue;
            }

            let key = table_at(&self.tables, table)?.key_bytes(slot);
            let value = self.value_of(table, table, slot)?;
            let cursor = cursor_at_mut(&mut self.cursors, cur)?;
            cursor.outer.next_slot = slot + 1;
            if cursor.outer.anchor.is_some() {
                cursor.outer.drained = true;
            }
            cursor.current = Some(Position {
                outer_slot: slot,
                inner: None,
                key: key.clone(),
            });
            return Ok(Some(Entry {
                key,
                value,
                position: slot,
            }));
        }
    }

    // =========================================================================
    // Cursor-relative Deletion
    // =========================================================================

    /// Delete the entry the cursor last yielded.
    ///
    /// Safe mid-iteration: slots are position-stable, so the scan never
    /// shifts under the cursor. Errors if the cursor has not yielded since
    /// opening or since its last deletion.
    pub fn delete_current(&mut self, cur: CursorId) -> Result<()> {
        let (table, position) = {
            let cursor = cursor_at(&self.cursors, cur)?;
            (cursor.table, cursor.current.clone())
        };
        let Some(position) = position else {
            return Err(LatticeError::InvalidCursor(cur.0));
        };

        // The slots may have been freed and reissued since the yield;
        // deleting then would take the new occupant. A stale position is a
        // no-op, like deleting an absent key.
        let fresh = {
            let outer = table_at(&self.tables, table)?;
            outer.slots.is_live(position.outer_slot)
                && outer.key_at(position.outer_slot) == &position.key[..]
                && match position.inner {
                    Some((group, slot)) => {
                        outer.value_handle(position.outer_slot) == group.0
                            && table_at(&self.tables, group)
                                .map(|g| g.slots.is_live(slot))
                                .unwrap_or(false)
                    }
                    None => true,
                }
        };
        if !fresh {
            let cursor = cursor_at_mut(&mut self.cursors, cur)?;
            cursor.current = None;
            return Ok(());
        }

        self.delete_entry(table, position.outer_slot, position.inner)?;

        // Deleting the last group member closes the group; drop the frame
        // so the scan moves to the next outer slot cleanly.
        let group_gone = match position.inner {
            Some((group, _)) => table_at(&self.tables, group).is_err(),
            None => false,
        };
        let cursor = cursor_at_mut(&mut self.cursors, cur)?;
        cursor.current = None;
        if group_gone {
            cursor.inner = None;
            cursor.outer_current = None;
        }
        Ok(())
    }
}

// =============================================================================
// Pool Accessors
// =============================================================================

fn cursor_at(cursors: &[Option<Cursor>], cur: CursorId) -> Result<&Cursor> {
    cursors
        .get(cur.0 as usize)
        .and_then(|slot| slot.as_ref())
        .ok_or(LatticeError::InvalidCursor(cur.0))
}

fn cursor_at_mut(cursors: &mut [Option<Cursor>], cur: CursorId) -> Result<&mut Cursor> {
    cursors
        .get_mut(cur.0 as usize)
        .and_then(|slot| slot.as_mut())
        .ok_or(LatticeError::InvalidCursor(cur.0))
}
