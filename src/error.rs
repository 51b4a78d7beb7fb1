//! Error types for latticekv
//!
//! Provides a unified error type for all operations. Lookup misses are
//! never errors; they surface as `Option`/no-ops at the call site.

use thiserror::Error;

/// Result type alias using LatticeError
pub type Result<T> = std::result::Result<T, LatticeError>;

/// Unified error type for latticekv operations
#[derive(Debug, Error)]
pub enum LatticeError {
    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("table capacity exceeded: {capacity} entries")]
    CapacityExceeded { capacity: usize },

    #[error("table limit reached: {0} open tables")]
    TableLimit(usize),

    #[error("cursor pool exhausted: {0} cursors")]
    CursorExhausted(usize),

    // -------------------------------------------------------------------------
    // Handle Errors
    // -------------------------------------------------------------------------
    #[error("invalid table handle: {0}")]
    InvalidHandle(u32),

    #[error("invalid cursor: {0}")]
    InvalidCursor(u32),

    // -------------------------------------------------------------------------
    // Type Errors
    // -------------------------------------------------------------------------
    #[error("unknown type id: {0}")]
    UnknownType(u32),

    #[error("type {0} is not a compound type")]
    NotCompound(u32),

    #[error("datum width mismatch: expected {expected} bytes, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("capacity mask {0:#x} + 1 is not a power of two")]
    InvalidMask(u32),

    #[error("association not supported: {0}")]
    AssocUnsupported(&'static str),

    #[error("operation requires an auto-index table")]
    AutoIndexRequired,
}
