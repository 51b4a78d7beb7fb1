//! Per-slot member storage
//!
//! One `MemberStore` holds one member (keys or values) for every slot of a
//! table. Fixed-width members live in a flat byte array; variable-length
//! members are one owned buffer per slot, replaced on overwrite and dropped
//! on delete, so each payload is freed exactly once.

use bytes::Bytes;

const EMPTY: &[u8] = &[];

/// Backing storage for one table member across all slots
pub(crate) enum MemberStore {
    /// Flat array, `width` bytes per slot
    Fixed { width: usize, data: Vec<u8> },

    /// One owned heap buffer per slot
    Heap { cells: Vec<Option<Bytes>> },
}

impl MemberStore {
    pub fn fixed(width: usize) -> Self {
        Self::Fixed {
            width,
            data: Vec::new(),
        }
    }

    pub fn heap() -> Self {
        Self::Heap { cells: Vec::new() }
    }

    /// Fixed width, or `None` for heap members
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::Fixed { width, .. } => Some(*width),
            Self::Heap { .. } => None,
        }
    }

    /// Write a datum at a slot, growing lazily toward capacity.
    ///
    /// Fixed members copy in place; heap members drop any prior buffer and
    /// own a fresh copy (move-on-overwrite).
    pub fn write(&mut self, slot: u32, datum: &[u8]) {
        let slot = slot as usize;
        match self {
            Self::Fixed { width, data } => {
                let offset = slot * *width;
                if data.len() < offset + *width {
                    data.resize(offset + *width, 0);
                }
                data[offset..offset + *width].copy_from_slice(datum);
            }
            Self::Heap { cells } => {
                if cells.len() <= slot {
                    cells.resize(slot + 1, None);
                }
                cells[slot] = Some(Bytes::copy_from_slice(datum));
            }
        }
    }

    /// Borrow the datum at a slot. Unwritten slots read as empty.
    pub fn read(&self, slot: u32) -> &[u8] {
        let slot = slot as usize;
        match self {
            Self::Fixed { width, data } => {
                let offset = slot * *width;
                data.get(offset..offset + *width).unwrap_or(EMPTY)
            }
            Self::Heap { cells } => cells
                .get(slot)
                .and_then(|cell| cell.as_deref())
                .unwrap_or(EMPTY),
        }
    }

    /// Owned copy of the datum at a slot (cheap clone for heap members)
    pub fn read_bytes(&self, slot: u32) -> Bytes {
        match self {
            Self::Fixed { .. } => Bytes::copy_from_slice(self.read(slot)),
            Self::Heap { cells } => cells
                .get(slot as usize)
                .and_then(|cell| cell.clone())
                .unwrap_or_else(Bytes::new),
        }
    }

    /// Release every slot's datum at once; heap buffers are all dropped here
    pub fn reset(&mut self) {
        match self {
            Self::Fixed { data, .. } => data.clear(),
            Self::Heap { cells } => cells.clear(),
        }
    }

    /// Release the datum at a slot; heap buffers are dropped here
    pub fn clear_slot(&mut self, slot: u32) {
        let slot = slot as usize;
        match self {
            Self::Fixed { width, data } => {
                let offset = slot * *width;
                if let Some(cell) = data.get_mut(offset..offset + *width) {
                    cell.fill(0);
                }
            }
            Self::Heap { cells } => {
                if let Some(cell) = cells.get_mut(slot) {
                    *cell = None;
                }
            }
        }
    }
}
