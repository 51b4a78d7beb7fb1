//! Tests for cursors
//!
//! These tests verify:
//! - Full scans in slot order, descending into multimap groups
//! - Anchored cursors scoped to one key
//! - Exhaustion auto-releases the cursor; finish abandons early
//! - Pool bounds and id reuse
//! - Cursor-relative deletion, including mid-iteration safety

use latticekv::{
    Engine, Handle, LatticeError, TableSpec, TypeId, MAX_CURSORS,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_filled_table(engine: &mut Engine, count: usize) -> Handle {
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES))
        .unwrap();
    for i in 0..count {
        engine
            .put(hd, format!("k{}", i).as_bytes(), format!("v{}", i).as_bytes())
            .unwrap();
    }
    hd
}

// =============================================================================
// Full Scan Tests
// =============================================================================

#[test]
fn test_scan_in_slot_order() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 3);

    let cur = engine.iterate(hd, None).unwrap();
    for expected in 0..3u32 {
        let entry = engine.advance(cur).unwrap().unwrap();
        assert_eq!(entry.position, expected);
        assert_eq!(entry.key, format!("k{}", expected).as_bytes());
        assert_eq!(entry.value, format!("v{}", expected).as_bytes());
    }
    assert!(engine.advance(cur).unwrap().is_none());
}

#[test]
fn test_scan_empty_table() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES))
        .unwrap();

    let cur = engine.iterate(hd, None).unwrap();
    assert!(engine.advance(cur).unwrap().is_none());
}

#[test]
fn test_scan_skips_deleted_slots() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 3);

    let cur = engine.iterate(hd, None).unwrap();
    let first = engine.advance(cur).unwrap().unwrap();
    assert_eq!(first.key, &b"k0"[..]);

    // Delete an entry the cursor has not reached yet; slots are stable so
    // the scan just skips the hole
    engine.del(hd, b"k1").unwrap();

    let next = engine.advance(cur).unwrap().unwrap();
    assert_eq!(next.key, &b"k2"[..]);
    assert!(engine.advance(cur).unwrap().is_none());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_exhaustion_releases_cursor() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 1);

    let cur = engine.iterate(hd, None).unwrap();
    engine.advance(cur).unwrap().unwrap();
    assert!(engine.advance(cur).unwrap().is_none());

    // The id is dead after exhaustion
    assert!(matches!(
        engine.advance(cur),
        Err(LatticeError::InvalidCursor(_))
    ));
    assert!(matches!(
        engine.finish(cur),
        Err(LatticeError::InvalidCursor(_))
    ));
}

#[test]
fn test_finish_abandons_early() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 10);

    let cur = engine.iterate(hd, None).unwrap();
    engine.advance(cur).unwrap().unwrap();

    engine.finish(cur).unwrap();
    assert!(matches!(
        engine.finish(cur),
        Err(LatticeError::InvalidCursor(_))
    ));
}

#[test]
fn test_pool_reuse() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 2);

    // Far more iterations than the pool holds; finished and exhausted
    // cursors both return their ids
    for _ in 0..(MAX_CURSORS * 4) {
        let cur = engine.iterate(hd, None).unwrap();
        while engine.advance(cur).unwrap().is_some() {}
    }
}

#[test]
fn test_pool_exhaustion() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 1);

    let held: Vec<_> = (0..MAX_CURSORS)
        .map(|_| engine.iterate(hd, None).unwrap())
        .collect();

    let err = engine.iterate(hd, None).unwrap_err();
    assert!(matches!(err, LatticeError::CursorExhausted(_)));

    for cur in held {
        engine.finish(cur).unwrap();
    }
    engine.iterate(hd, None).unwrap();
}

// =============================================================================
// Anchored Cursor Tests
// =============================================================================

#[test]
fn test_anchor_scopes_to_one_key() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 5);

    let cur = engine.iterate(hd, Some(b"k2")).unwrap();
    let entry = engine.advance(cur).unwrap().unwrap();
    assert_eq!(entry.key, &b"k2"[..]);
    assert!(engine.advance(cur).unwrap().is_none());
}

#[test]
fn test_anchor_missing_key_yields_nothing() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 3);

    let cur = engine.iterate(hd, Some(b"absent")).unwrap();
    assert!(engine.advance(cur).unwrap().is_none());
}

#[test]
fn test_anchor_survives_slot_reuse() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES))
        .unwrap();
    engine.put(hd, b"a", b"1").unwrap();

    // Delete the anchor key after opening; a new key takes the freed slot
    let cur = engine.iterate(hd, Some(b"a")).unwrap();
    engine.del(hd, b"a").unwrap();
    engine.put(hd, b"b", b"2").unwrap();

    // The slot is live again but holds a different key, so nothing yields
    assert!(engine.advance(cur).unwrap().is_none());
}

#[test]
fn test_anchor_on_multimap_yields_group() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES).multi_value())
        .unwrap();
    engine.put(hd, b"k", b"a").unwrap();
    engine.put(hd, b"k", b"b").unwrap();
    engine.put(hd, b"noise", b"x").unwrap();

    let cur = engine.iterate(hd, Some(b"k")).unwrap();
    let mut values = Vec::new();
    while let Some(entry) = engine.advance(cur).unwrap() {
        assert_eq!(entry.key, &b"k"[..]);
        values.push(entry.value.to_vec());
    }
    assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
}

// =============================================================================
// Cursor-relative Deletion Tests
// =============================================================================

#[test]
fn test_delete_current_drains_table() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 4);

    let cur = engine.iterate(hd, None).unwrap();
    while engine.advance(cur).unwrap().is_some() {
        engine.delete_current(cur).unwrap();
    }

    assert!(engine.is_empty(hd).unwrap());
}

#[test]
fn test_delete_current_requires_yielded_entry() {
    let mut engine = Engine::new();
    let hd = setup_filled_table(&mut engine, 2);

    let cur = engine.iterate(hd, None).unwrap();
    assert!(matches!(
        engine.delete_current(cur),
        Err(LatticeError::InvalidCursor(_))
    ));

    engine.advance(cur).unwrap().unwrap();
    engine.delete_current(cur).unwrap();

    // One deletion per yield
    assert!(matches!(
        engine.delete_current(cur),
        Err(LatticeError::InvalidCursor(_))
    ));
    engine.finish(cur).unwrap();
}

#[test]
fn test_delete_current_in_groups() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES).multi_value())
        .unwrap();
    engine.put(hd, b"k1", b"a").unwrap();
    engine.put(hd, b"k1", b"b").unwrap();
    engine.put(hd, b"k2", b"c").unwrap();

    // Delete every member as it is yielded; emptied groups close and the
    // scan keeps moving
    let cur = engine.iterate(hd, None).unwrap();
    let mut deleted = 0;
    while engine.advance(cur).unwrap().is_some() {
        engine.delete_current(cur).unwrap();
        deleted += 1;
    }

    assert_eq!(deleted, 3);
    assert!(engine.is_empty(hd).unwrap());
}

#[test]
fn test_delete_current_selective() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES).multi_value())
        .unwrap();
    engine.put(hd, b"k", b"keep").unwrap();
    engine.put(hd, b"k", b"drop").unwrap();
    engine.put(hd, b"k", b"keep2").unwrap();

    let cur = engine.iterate(hd, None).unwrap();
    while let Some(entry) = engine.advance(cur).unwrap() {
        if entry.value == &b"drop"[..] {
            engine.delete_current(cur).unwrap();
        }
    }

    let cur = engine.iterate(hd, Some(b"k")).unwrap();
    let mut values = Vec::new();
    while let Some(entry) = engine.advance(cur).unwrap() {
        values.push(entry.value.to_vec());
    }
    assert_eq!(values, vec![b"keep".to_vec(), b"keep2".to_vec()]);
}

#[test]
fn test_delete_current_spares_reused_slot() {
    let mut engine = Engine::new();
    let hd = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES))
        .unwrap();
    engine.put(hd, b"old", b"1").unwrap();

    let cur = engine.iterate(hd, None).unwrap();
    let entry = engine.advance(cur).unwrap().unwrap();
    assert_eq!(entry.key, &b"old"[..]);

    // The yielded entry goes away externally and its slot is reissued
    engine.del(hd, b"old").unwrap();
    engine.put(hd, b"new", b"2").unwrap();

    // Deleting the stale position is a no-op; the new occupant survives
    engine.delete_current(cur).unwrap();
    assert_eq!(&engine.get(hd, b"new").unwrap().unwrap()[..], b"2");

    // The position was consumed all the same
    assert!(matches!(
        engine.delete_current(cur),
        Err(LatticeError::InvalidCursor(_))
    ));
    engine.finish(cur).unwrap();
}

#[test]
fn test_delete_current_through_mirror() {
    let mut engine = Engine::new();
    let primary = engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES).two_way())
        .unwrap();
    let mirror = engine.mirror(primary).unwrap();
    engine.put(primary, b"k1", b"v1").unwrap();
    engine.put(primary, b"k2", b"v2").unwrap();

    // Cursor over the mirror deletes through to the primary
    let cur = engine.iterate(mirror, Some(b"v1")).unwrap();
    engine.advance(cur).unwrap().unwrap();
    engine.delete_current(cur).unwrap();
    assert!(engine.advance(cur).unwrap().is_none());

    assert!(engine.get(primary, b"k1").unwrap().is_none());
    assert_eq!(&engine.get(primary, b"k2").unwrap().unwrap()[..], b"v2");
}
