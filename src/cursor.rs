//! Cursor state
//!
//! A cursor is resumable iteration over one table, optionally anchored to a
//! single key. Nesting into multimap group tables is exactly one level deep,
//! so the state is an explicit pair of frames (outer + optional inner)
//! rather than recursive sub-cursors.
//!
//! Cursors live in the engine's bounded pool; the iteration operations
//! themselves are engine methods.

use bytes::Bytes;

use crate::engine::Handle;

/// Opaque index into the engine's cursor pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(pub(crate) u32);

impl CursorId {
    /// Raw pool index (debugging aid)
    pub fn index(self) -> u32 {
        self.0
    }
}

/// One entry yielded by a cursor
#[derive(Debug, Clone)]
pub struct Entry {
    /// Key bytes; the outer key for entries inside a multimap group
    pub key: Bytes,

    /// Value bytes; the primary's key for primary-key-get secondaries
    pub value: Bytes,

    /// Slot the value physically occupies (group slot for nested entries)
    pub position: u32,
}

/// Iteration progress over one table
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub handle: Handle,

    /// Next slot the scan will examine
    pub next_slot: u32,

    /// Anchored frames visit this one slot, then drain. The key bytes are
    /// kept so a freed-and-reused slot never yields a foreign entry.
    pub anchor: Option<(u32, Bytes)>,

    /// Nothing left to yield
    pub drained: bool,
}

impl Frame {
    /// Full scan from slot zero
    pub fn scan(handle: Handle) -> Self {
        Self {
            handle,
            next_slot: 0,
            anchor: None,
            drained: false,
        }
    }

    /// Scoped to one resolved slot holding the anchor key
    pub fn anchored(handle: Handle, slot: u32, key: Bytes) -> Self {
        Self {
            handle,
            next_slot: slot,
            anchor: Some((slot, key)),
            drained: false,
        }
    }

    /// Already exhausted (anchor key not found)
    pub fn drained(handle: Handle) -> Self {
        Self {
            handle,
            next_slot: 0,
            anchor: None,
            drained: true,
        }
    }
}

/// The entry a cursor last yielded, for cursor-relative deletion
#[derive(Debug, Clone)]
pub(crate) struct Position {
    pub outer_slot: u32,

    /// Group table and slot when the entry lives in a nested group
    pub inner: Option<(Handle, u32)>,

    /// Key bytes at yield time; a slot reused since then no longer matches
    /// and must not be deleted
    pub key: Bytes,
}

/// One pooled cursor: outer frame, lazily materialized inner frame
pub(crate) struct Cursor {
    /// Table this cursor iterates (the outer table for multimaps)
    pub table: Handle,

    pub outer: Frame,

    /// Outer slot currently being descended into
    pub outer_current: Option<u32>,

    /// Frame over the nested group under `outer_current`
    pub inner: Option<Frame>,

    /// Last yielded entry, cleared by cursor-relative deletion
    pub current: Option<Position>,
}

impl Cursor {
    pub fn new(table: Handle, outer: Frame) -> Self {
        Self {
            table,
            outer,
            outer_current: None,
            inner: None,
            current: None,
        }
    }
}
