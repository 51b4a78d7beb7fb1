//! # LatticeKV
//!
//! An embeddable, in-process associative storage engine:
//! - Handle-addressed typed key/value tables with bounded capacity
//! - Dense, position-stable integer slots and auto-indexed inserts
//! - Multimaps backed by nested, auto-indexed group tables
//! - Associations: mirrors, two-way tables, and many-to-many pairs with
//!   reverse deletion across the whole group
//! - Pooled resumable cursors, safe for mid-iteration deletion
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │       (handle space, cursor pool, association edges)         │
//! └────────┬──────────────────┬──────────────────┬──────────────┘
//!          │                  │                  │
//!          ▼                  ▼                  ▼
//!   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!   │    Types    │    │   Tables    │    │   Cursors   │
//!   │ (registry,  │    │ (placement, │    │ (frames,    │
//!   │  compounds) │    │  members)   │    │  positions) │
//!   └─────────────┘    └──────┬──────┘    └─────────────┘
//!                             │
//!                             ▼
//!                      ┌─────────────┐
//!                      │    Slots    │
//!                      │ (allocator) │
//!                      └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;

pub mod alloc;
pub mod assoc;
pub mod cursor;
pub mod engine;
pub mod types;

mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use alloc::SlotAllocator;
pub use assoc::{CompoundHead, DeriveKey, Mirror, Twin};
pub use cursor::{CursorId, Entry};
pub use engine::{Engine, Handle, TableSpec, DEFAULT_MASK, MAX_CURSORS, MAX_TABLES};
pub use error::{LatticeError, Result};
pub use types::{Member, TypeDescriptor, TypeId, TypeRegistry};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LatticeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
