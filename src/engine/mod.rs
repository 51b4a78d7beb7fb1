//! Engine Module
//!
//! The engine owns every piece of process state the storage substrate
//! needs: the table registry (handle space), the type registry, the
//! association edges, and the cursor pool.
//!
//! ## Responsibilities
//! - Table lifecycle: open (including TWO_WAY mirror wiring), close, clear
//! - Handle validation: every operation takes a handle checked here
//! - Type registration and the measure/compare/format debug helpers
//!
//! Mutation and lookup live in `ops`, association fan-out in `assoc`,
//! cursor operations in `iterate`.
//!
//! ## Concurrency Model
//!
//! Single-threaded by contract: every operation runs to completion before
//! returning, and nothing here locks. Callers needing multi-threaded access
//! wrap the engine in their own mutual exclusion.

mod assoc;
mod iterate;
mod ops;

use std::cmp::Ordering;

use bytes::Bytes;

use crate::alloc::SlotAllocator;
use crate::cursor::Cursor;
use crate::error::{LatticeError, Result};
use crate::table::{Table, TableFlags};
use crate::types::{encode_pair, Member, TypeDescriptor, TypeId, TypeRegistry};

// =============================================================================
// Limits and Defaults
// =============================================================================

/// Bounded handle space: open tables plus resident multimap groups
pub const MAX_TABLES: usize = 1024;

/// Bounded cursor pool
pub const MAX_CURSORS: usize = 256;

/// Default capacity mask (32768 entries) when a spec leaves it unset
pub const DEFAULT_MASK: u32 = 0x7FFF;

// =============================================================================
// Handles
// =============================================================================

/// Opaque reference to one open table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u32);

impl Handle {
    /// Raw registry index (debugging aid)
    pub fn index(self) -> u32 {
        self.0
    }
}

// =============================================================================
// Table Specification
// =============================================================================

/// Builder for opening a table
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    key_type: TypeId,
    value_type: TypeId,
    capacity_mask: u32,
    auto_index: bool,
    multi_value: bool,
    primary_key_get: bool,
    two_way: bool,
}

impl TableSpec {
    /// Spec with the default capacity mask and no flags
    pub fn new(key_type: TypeId, value_type: TypeId) -> Self {
        Self {
            key_type,
            value_type,
            capacity_mask: DEFAULT_MASK,
            auto_index: false,
            multi_value: false,
            primary_key_get: false,
            two_way: false,
        }
    }

    /// Set the capacity mask; `mask + 1` must be a power of two and is the
    /// hard upper bound on live entries
    pub fn capacity_mask(mut self, mask: u32) -> Self {
        self.capacity_mask = mask;
        self
    }

    /// Absent keys draw a dense integer slot used as the key
    pub fn auto_index(mut self) -> Self {
        self.auto_index = true;
        self
    }

    /// Duplicate-key (multimap) semantics
    pub fn multi_value(mut self) -> Self {
        self.multi_value = true;
        self
    }

    /// As a secondary, answer value reads with the primary's key
    pub fn primary_key_get(mut self) -> Self {
        self.primary_key_get = true;
        self
    }

    /// Also open and wire a mirror at the next handle
    pub fn two_way(mut self) -> Self {
        self.two_way = true;
        self
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The storage engine: tables, types, associations, cursors
pub struct Engine {
    registry: TypeRegistry,
    tables: Vec<Option<Table>>,
    handles: SlotAllocator,
    cursors: Vec<Option<Cursor>>,
    cursor_ids: SlotAllocator,

    /// Distinguished multimap recording "secondary depends on primary" edges,
    /// keyed by primary handle
    edges: Handle,
}

impl Engine {
    /// Build an engine: seed the built-in types and open the distinguished
    /// association-edge table
    pub fn new() -> Self {
        let registry = TypeRegistry::with_builtins();
        let mut handles = SlotAllocator::new();
        let mut tables = Vec::new();

        // The edge table is the first resident of the handle space; its key
        // space is the handle space itself.
        let edges = Handle(handles.allocate());
        let flags = TableFlags {
            multi_value: true,
            ..Default::default()
        };
        tables.push(Some(Table::new(
            TypeId::HANDLE,
            TypeId::HANDLE,
            (MAX_TABLES - 1) as u32,
            flags,
            Some(4),
            Some(4),
        )));

        tracing::debug!("engine initialized, edge table at handle {}", edges.0);

        Self {
            registry,
            tables,
            handles,
            cursors: Vec::new(),
            cursor_ids: SlotAllocator::new(),
            edges,
        }
    }

    // =========================================================================
    // Type Registration
    // =========================================================================

    /// Register a fixed-width type
    pub fn register_fixed(&mut self, width: usize) -> TypeId {
        self.registry.register(TypeDescriptor::fixed(width))
    }

    /// Register a variable-length type with a measuring function
    pub fn register_variable(&mut self, measure: impl Fn(&[u8]) -> usize + 'static) -> TypeId {
        self.registry.register(TypeDescriptor::variable(measure))
    }

    /// Register a fully specified descriptor
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> TypeId {
        self.registry.register(descriptor)
    }

    /// Register a compound type concatenating two registered types
    pub fn register_compound(&mut self, head: TypeId, tail: TypeId) -> Result<TypeId> {
        self.registry.register_compound(head, tail)
    }

    // =========================================================================
    // Table Lifecycle
    // =========================================================================

    /// Open a table per `spec`, returning its handle.
    ///
    /// TWO_WAY opens a mirror at `handle + 1` (multi-value, primary-key-get,
    /// key/value types swapped) wired with the mirror derivation. TWO_WAY
    /// plus multi-value opens the many-to-many form: a compound-keyed
    /// primary plus value-side and key-side indexes at `handle + 1` and
    /// `handle + 2`.
    pub fn open(&mut self, spec: TableSpec) -> Result<Handle> {
        spec.capacity_mask
            .checked_add(1)
            .filter(|capacity| capacity.is_power_of_two())
            .ok_or(LatticeError::InvalidMask(spec.capacity_mask))?;
        self.registry.check(spec.key_type)?;
        self.registry.check(spec.value_type)?;
        if spec.auto_index && self.registry.fixed_width(spec.key_type)? != Some(4) {
            return Err(LatticeError::WidthMismatch {
                expected: 4,
                actual: self.registry.fixed_width(spec.key_type)?.unwrap_or(0),
            });
        }

        if !spec.two_way {
            let flags = TableFlags {
                auto_index: spec.auto_index,
                multi_value: spec.multi_value,
                primary_key_get: spec.primary_key_get,
            };
            return self.open_raw(spec.key_type, spec.value_type, spec.capacity_mask, flags);
        }
        if spec.multi_value {
            self.open_many_to_many(spec)
        } else {
            self.open_two_way(spec)
        }
    }

    fn open_two_way(&mut self, spec: TableSpec) -> Result<Handle> {
        if self.handles.high_water() as usize + 2 > MAX_TABLES {
            return Err(LatticeError::TableLimit(MAX_TABLES));
        }
        let first = self.handles.allocate_run(2);
        let primary = Handle(first);
        let mirror = Handle(first + 1);

        self.install(
            primary,
            spec.key_type,
            spec.value_type,
            spec.capacity_mask,
            TableFlags {
                auto_index: spec.auto_index,
                ..Default::default()
            },
        )?;
        self.install(
            mirror,
            spec.value_type,
            spec.key_type,
            spec.capacity_mask,
            TableFlags {
                multi_value: true,
                primary_key_get: true,
                ..Default::default()
            },
        )?;
        table_at_mut(&mut self.tables, primary)?.partners = vec![mirror];

        self.assoc(mirror, primary, None)?;
        tracing::debug!("two-way open: primary {} mirror {}", primary.0, mirror.0);
        Ok(primary)
    }

    /// Many-to-many: compound-keyed primary plus two multimap indexes
    fn open_many_to_many(&mut self, spec: TableSpec) -> Result<Handle> {
        if self.handles.high_water() as usize + 3 > MAX_TABLES {
            return Err(LatticeError::TableLimit(MAX_TABLES));
        }
        let pair_type = self.registry.register_compound(spec.key_type, spec.value_type)?;
        let first = self.handles.allocate_run(3);
        let primary = Handle(first);
        let value_index = Handle(first + 1);
        let key_index = Handle(first + 2);

        self.install(
            primary,
            pair_type,
            spec.value_type,
            spec.capacity_mask,
            TableFlags::default(),
        )?;
        let index_flags = TableFlags {
            multi_value: true,
            primary_key_get: true,
            ..Default::default()
        };
        self.install(
            value_index,
            spec.value_type,
            pair_type,
            spec.capacity_mask,
            index_flags,
        )?;
        self.install(
            key_index,
            spec.key_type,
            pair_type,
            spec.capacity_mask,
            index_flags,
        )?;
        {
            let table = table_at_mut(&mut self.tables, primary)?;
            table.pair = Some(pair_type);
            table.partners = vec![value_index, key_index];
        }

        self.assoc(value_index, primary, None)?;
        self.assoc(key_index, primary, Some(Box::new(crate::assoc::CompoundHead)))?;
        tracing::debug!(
            "many-to-many open: primary {} value index {} key index {}",
            primary.0,
            value_index.0,
            key_index.0
        );
        Ok(primary)
    }

    /// Allocate a handle and install a fresh table under it
    pub(crate) fn open_raw(
        &mut self,
        key_type: TypeId,
        value_type: TypeId,
        mask: u32,
        flags: TableFlags,
    ) -> Result<Handle> {
        let raw = self.handles.allocate();
        if raw as usize >= MAX_TABLES {
            self.handles.free(raw);
            return Err(LatticeError::TableLimit(MAX_TABLES));
        }
        let handle = Handle(raw);
        if let Err(err) = self.install(handle, key_type, value_type, mask, flags) {
            self.handles.free(raw);
            return Err(err);
        }
        Ok(handle)
    }

    fn install(
        &mut self,
        handle: Handle,
        key_type: TypeId,
        value_type: TypeId,
        mask: u32,
        flags: TableFlags,
    ) -> Result<()> {
        let key_width = self.registry.fixed_width(key_type)?;
        let value_width = self.registry.fixed_width(value_type)?;
        let table = Table::new(key_type, value_type, mask, flags, key_width, value_width);
        let index = handle.0 as usize;
        if self.tables.len() <= index {
            self.tables.resize_with(index + 1, || None);
        }
        self.tables[index] = Some(table);
        tracing::debug!(
            "opened table {} (mask {:#x}, auto_index={}, multi_value={})",
            handle.0,
            mask,
            flags.auto_index,
            flags.multi_value
        );
        Ok(())
    }

    /// Close a table: drain it (fanning deletions to secondaries when it is
    /// a primary), unregister association edges in both directions, release
    /// resident groups, free the handle, and recursively close TWO_WAY
    /// partners.
    pub fn close(&mut self, hd: Handle) -> Result<()> {
        let (partners, primary, multi) = {
            let table = self.table(hd)?;
            (table.partners.clone(), table.primary, table.flags.multi_value)
        };

        // As a primary: drain with fan-out, then sever the secondaries
        let secondaries = self.secondaries(hd);
        if !secondaries.is_empty() {
            self.clear(hd)?;
            for &secondary in &secondaries {
                if let Ok(table) = table_at_mut(&mut self.tables, secondary) {
                    table.primary = None;
                    table.derive = None;
                }
                tracing::warn!("severed secondary {} of closing table {}", secondary.0, hd.0);
            }
            let edges = self.edges;
            self.del(edges, &hd.0.to_ne_bytes())?;
        }

        // As a secondary: drop the membership edge and the partner link, so
        // the primary never follows this handle after reuse
        if let Some(primary) = primary {
            let edges = self.edges;
            self.del_value(edges, &primary.0.to_ne_bytes(), &hd.0.to_ne_bytes())?;
            if let Ok(table) = table_at_mut(&mut self.tables, primary) {
                table.partners.retain(|&partner| partner != hd);
            }
        }

        // Resident multimap groups go with the table
        if multi {
            let groups: Vec<Handle> = {
                let table = self.table(hd)?;
                table
                    .live_slots()
                    .iter()
                    .map(|&slot| Handle(table.value_handle(slot)))
                    .collect()
            };
            for group in groups {
                self.close_raw(group);
            }
        }

        self.tables[hd.0 as usize] = None;
        self.handles.free(hd.0);
        tracing::debug!("closed table {}", hd.0);

        for partner in partners {
            if self.table(partner).is_ok() {
                self.close(partner)?;
            }
        }
        Ok(())
    }

    /// Drop a table without ceremony; used for nested groups, whose
    /// payloads are owned and freed with the table value itself
    pub(crate) fn close_raw(&mut self, hd: Handle) {
        if let Some(slot) = self.tables.get_mut(hd.0 as usize) {
            if slot.take().is_some() {
                self.handles.free(hd.0);
                tracing::debug!("released table {}", hd.0);
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Live entries in the table itself (distinct keys for multimaps)
    pub fn len(&self, hd: Handle) -> Result<usize> {
        Ok(self.table(hd)?.len())
    }

    pub fn is_empty(&self, hd: Handle) -> Result<bool> {
        Ok(self.table(hd)?.len() == 0)
    }

    /// Hard upper bound on live entries, fixed at open time
    pub fn capacity(&self, hd: Handle) -> Result<usize> {
        Ok(self.table(hd)?.capacity())
    }

    pub fn key_type(&self, hd: Handle) -> Result<TypeId> {
        Ok(self.table(hd)?.key_type)
    }

    pub fn value_type(&self, hd: Handle) -> Result<TypeId> {
        Ok(self.table(hd)?.value_type)
    }

    /// TWO_WAY partner of a primary
    pub fn mirror(&self, hd: Handle) -> Result<Handle> {
        self.table(hd)?
            .partners
            .first()
            .copied()
            .ok_or(LatticeError::InvalidHandle(hd.0))
    }

    // =========================================================================
    // Debug Helpers
    // =========================================================================

    /// Size of a datum under one of the table's member types
    pub fn measure(&self, hd: Handle, member: Member, datum: &[u8]) -> Result<usize> {
        let id = self.member_type(hd, member)?;
        self.registry.measure(id, datum)
    }

    /// Compare two data under one of the table's member types
    pub fn compare(&self, hd: Handle, member: Member, a: &[u8], b: &[u8]) -> Result<Ordering> {
        let id = self.member_type(hd, member)?;
        self.registry.compare(id, a, b)
    }

    /// Render a datum under one of the table's member types
    pub fn format(&self, hd: Handle, member: Member, datum: &[u8]) -> Result<String> {
        let id = self.member_type(hd, member)?;
        self.registry.format(id, datum)
    }

    /// Recover the two parts of a compound datum
    pub fn split(&self, id: TypeId, datum: &[u8]) -> Result<(Bytes, Bytes)> {
        self.registry.split(id, datum)
    }

    /// Encode a (key, value) pair into a many-to-many primary's compound key
    pub fn pair_key(&self, hd: Handle, key: &[u8], value: &[u8]) -> Result<Bytes> {
        let table = self.table(hd)?;
        match table.pair {
            Some(_) => Ok(encode_pair(key, value)),
            None => Err(LatticeError::NotCompound(table.key_type.0)),
        }
    }

    fn member_type(&self, hd: Handle, member: Member) -> Result<TypeId> {
        let table = self.table(hd)?;
        Ok(match member {
            Member::Key => table.key_type,
            Member::Value => table.value_type,
        })
    }

    // =========================================================================
    // Internal Accessors
    // =========================================================================

    pub(crate) fn table(&self, hd: Handle) -> Result<&Table> {
        table_at(&self.tables, hd)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Split-borrow Accessors
// =============================================================================

// Free functions so callers can borrow one table mutably while the registry
// (a sibling field) stays shared.

pub(crate) fn table_at(tables: &[Option<Table>], hd: Handle) -> Result<&Table> {
    tables
        .get(hd.0 as usize)
        .and_then(|slot| slot.as_ref())
        .ok_or(LatticeError::InvalidHandle(hd.0))
}

pub(crate) fn table_at_mut(tables: &mut [Option<Table>], hd: Handle) -> Result<&mut Table> {
    tables
        .get_mut(hd.0 as usize)
        .and_then(|slot| slot.as_mut())
        .ok_or(LatticeError::InvalidHandle(hd.0))
}
