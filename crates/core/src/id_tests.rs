// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

// --- define_id! macro tests ---

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_new_applies_prefix_and_fits_id_max_len() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn define_id_new_ids_are_unique() {
    assert_ne!(TestId::new(), TestId::new());
}

#[test]
fn define_id_from_string_round_trips() {
    let id = TestId::from_string("tst-k");
    assert_eq!(id.as_str(), "tst-k");
    assert_eq!(id.suffix(), "k");
}

#[test]
fn define_id_hash_map_lookup_by_borrowed_str() {
    let mut map = HashMap::new();
    map.insert(TestId::from_string("tst-k"), 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.suffix(), "abcdefghijklmnop");
}

#[test]
fn define_id_suffix_falls_back_to_full_string_without_prefix() {
    let id = TestId::from_string("nopfx");
    assert_eq!(id.suffix(), "nopfx");
}

#[test]
fn define_id_short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn define_id_short_returns_full_suffix_when_shorter() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id.short(8), "abc");
}

#[test]
fn define_id_is_empty_detects_empty_buffer() {
    assert!(!TestId::new().is_empty());
    assert!(TestId::from_string("").is_empty());
}

#[test]
fn define_id_default_generates_a_fresh_id() {
    assert!(!TestId::default().is_empty());
}

#[test]
fn define_id_from_conversions_agree() {
    let from_str: TestId = "tst-x".into();
    let from_string: TestId = "tst-x".to_string().into();
    let from_ref: TestId = (&"tst-x".to_string()).into();
    assert_eq!(from_str, from_string);
    assert_eq!(from_str, from_ref);
}

#[test]
fn define_id_partial_eq_str() {
    let id = TestId::from_string("tst-y");
    assert_eq!(id, "tst-y");
    assert_eq!(id, *"tst-y".to_string().as_str());
}

#[test]
fn define_id_deref_exposes_str_methods() {
    let id = TestId::from_string("tst-z");
    assert!(id.ends_with('z'));
}

// --- short() free function tests ---

#[test]
fn short_fn_on_str() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
    assert_eq!(short("abc", 8), "abc");
}

// --- IdBuf tests ---

#[test]
fn idbuf_empty_has_zero_length() {
    assert!(IdBuf::empty().is_empty());
}

#[test]
fn idbuf_as_str_round_trips() {
    let buf = IdBuf::new("hello");
    assert_eq!(buf.as_str(), "hello");
}

#[test]
fn idbuf_hash_matches_str_hash_for_borrow_lookup() {
    let mut map: HashMap<IdBuf, i32> = HashMap::new();
    map.insert(IdBuf::new("k"), 1);
    assert_eq!(map.get("k"), Some(&1));
}

#[test]
fn idbuf_serde_round_trip() {
    let buf = IdBuf::new("abc");
    let json = serde_json::to_string(&buf).expect("serialize");
    let back: IdBuf = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(buf, back);
}

#[test]
fn idbuf_deserialize_rejects_oversized_strings() {
    let oversized = "x".repeat(ID_MAX_LEN + 1);
    let json = serde_json::to_string(&oversized).expect("serialize");
    let result: Result<IdBuf, _> = serde_json::from_str(&json);
    assert!(result.is_err());
}
