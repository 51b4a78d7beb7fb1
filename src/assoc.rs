//! Secondary-key derivation
//!
//! When a table is registered as a secondary of a primary, every primary
//! mutation is projected into it under a derived key. The derivation is a
//! one-method interface over the primary's (key, value) pair; the stored
//! secondary value is always the primary's key, giving O(1) reverse lookup.

use bytes::Bytes;

use crate::types::split_pair;

/// Derives the secondary key for a projected primary entry
pub trait DeriveKey {
    fn derive(&self, primary_key: &[u8], primary_value: &[u8]) -> Bytes;
}

/// Mirror derivation: secondary key is the primary's value.
///
/// This is the default wiring, and what TWO_WAY opens install.
pub struct Mirror;

impl DeriveKey for Mirror {
    fn derive(&self, _primary_key: &[u8], primary_value: &[u8]) -> Bytes {
        Bytes::copy_from_slice(primary_value)
    }
}

/// Twin derivation: secondary key is the primary's key, making the
/// secondary a same-keyed shadow of the primary.
pub struct Twin;

impl DeriveKey for Twin {
    fn derive(&self, primary_key: &[u8], _primary_value: &[u8]) -> Bytes {
        Bytes::copy_from_slice(primary_key)
    }
}

/// Compound-head derivation: secondary key is the first part of a compound
/// primary key. Used for the key-side index of many-to-many mirrors.
pub struct CompoundHead;

impl DeriveKey for CompoundHead {
    fn derive(&self, primary_key: &[u8], _primary_value: &[u8]) -> Bytes {
        match split_pair(primary_key) {
            Some((head, _)) => Bytes::copy_from_slice(head),
            None => Bytes::new(),
        }
    }
}
