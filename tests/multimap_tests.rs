//! Tests for multimap (duplicate-key) tables
//!
//! These tests verify:
//! - Multiple values under one key, in insertion order
//! - Get answers with the key's first live value
//! - Value-targeted deletion removes exactly one entry
//! - Key deletion removes the whole group
//! - Empty groups close themselves and release the outer key
//! - len counts distinct keys

use latticekv::{Engine, Handle, TableSpec, TypeId};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_multimap(engine: &mut Engine) -> Handle {
    engine
        .open(TableSpec::new(TypeId::BYTES, TypeId::BYTES).multi_value())
        .unwrap()
}

fn collect_values(engine: &mut Engine, hd: Handle, key: &[u8]) -> Vec<Vec<u8>> {
    let cur = engine.iterate(hd, Some(key)).unwrap();
    let mut values = Vec::new();
    while let Some(entry) = engine.advance(cur).unwrap() {
        assert_eq!(&entry.key[..], key);
        values.push(entry.value.to_vec());
    }
    values
}

// =============================================================================
// Insertion Tests
// =============================================================================

#[test]
fn test_duplicate_keys_accumulate() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"a").unwrap();
    engine.put(hd, b"k", b"b").unwrap();
    engine.put(hd, b"k", b"c").unwrap();

    assert_eq!(
        collect_values(&mut engine, hd, b"k"),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
}

#[test]
fn test_len_counts_distinct_keys() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k1", b"a").unwrap();
    engine.put(hd, b"k1", b"b").unwrap();
    engine.put(hd, b"k2", b"c").unwrap();

    assert_eq!(engine.len(hd).unwrap(), 2);
}

#[test]
fn test_get_answers_first_value() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"first").unwrap();
    engine.put(hd, b"k", b"second").unwrap();

    let value = engine.get(hd, b"k").unwrap().unwrap();
    assert_eq!(&value[..], b"first");
}

#[test]
fn test_groups_are_independent() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k1", b"a").unwrap();
    engine.put(hd, b"k2", b"x").unwrap();
    engine.put(hd, b"k1", b"b").unwrap();
    engine.put(hd, b"k2", b"y").unwrap();

    assert_eq!(
        collect_values(&mut engine, hd, b"k1"),
        vec![b"a".to_vec(), b"b".to_vec()]
    );
    assert_eq!(
        collect_values(&mut engine, hd, b"k2"),
        vec![b"x".to_vec(), b"y".to_vec()]
    );
}

// =============================================================================
// Deletion Tests
// =============================================================================

#[test]
fn test_del_value_removes_one() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"a").unwrap();
    engine.put(hd, b"k", b"b").unwrap();
    engine.put(hd, b"k", b"c").unwrap();

    engine.del_value(hd, b"k", b"b").unwrap();

    assert_eq!(
        collect_values(&mut engine, hd, b"k"),
        vec![b"a".to_vec(), b"c".to_vec()]
    );
}

#[test]
fn test_del_value_missing_is_noop() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"a").unwrap();
    engine.del_value(hd, b"k", b"nope").unwrap();
    engine.del_value(hd, b"other", b"a").unwrap();

    assert_eq!(engine.len(hd).unwrap(), 1);
}

#[test]
fn test_del_removes_whole_group() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"a").unwrap();
    engine.put(hd, b"k", b"b").unwrap();
    engine.put(hd, b"other", b"x").unwrap();

    engine.del(hd, b"k").unwrap();

    assert!(engine.get(hd, b"k").unwrap().is_none());
    assert_eq!(engine.len(hd).unwrap(), 1);
    assert!(engine.get(hd, b"other").unwrap().is_some());
}

#[test]
fn test_empty_group_releases_key() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k", b"only").unwrap();
    engine.del_value(hd, b"k", b"only").unwrap();

    // Removing the last member drops the key itself
    assert!(engine.get(hd, b"k").unwrap().is_none());
    assert_eq!(engine.len(hd).unwrap(), 0);

    // And the key can start a fresh group
    engine.put(hd, b"k", b"again").unwrap();
    assert_eq!(&engine.get(hd, b"k").unwrap().unwrap()[..], b"again");
}

#[test]
fn test_clear_multimap() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    for i in 0..5 {
        engine.put(hd, format!("k{}", i).as_bytes(), b"a").unwrap();
        engine.put(hd, format!("k{}", i).as_bytes(), b"b").unwrap();
    }
    engine.clear(hd).unwrap();

    assert!(engine.is_empty(hd).unwrap());
    engine.put(hd, b"k0", b"v").unwrap();
    assert_eq!(engine.len(hd).unwrap(), 1);
}

// =============================================================================
// Full Scan Tests
// =============================================================================

#[test]
fn test_scan_visits_every_member() {
    let mut engine = Engine::new();
    let hd = setup_multimap(&mut engine);

    engine.put(hd, b"k1", b"a").unwrap();
    engine.put(hd, b"k1", b"b").unwrap();
    engine.put(hd, b"k2", b"c").unwrap();

    let cur = engine.iterate(hd, None).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = engine.advance(cur).unwrap() {
        seen.push((entry.key.to_vec(), entry.value.to_vec()));
    }

    assert_eq!(
        seen,
        vec![
            (b"k1".to_vec(), b"a".to_vec()),
            (b"k1".to_vec(), b"b".to_vec()),
            (b"k2".to_vec(), b"c".to_vec()),
        ]
    );
}
