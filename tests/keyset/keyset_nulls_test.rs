//! Tests for keyset predicates over nullable ORDER BY keys.

#[path = "../common/mod.rs"]
mod common;

use criteria::config::QueryConfig;
use criteria::keyset::{Keyset, KeysetMode, KeysetPage};
use criteria::metadata::StaticMetamodel;
use criteria::sql::dialect::Dialect;
use criteria::CriteriaBuilder;
use serde_json::Value;

fn page(lowest: Vec<Value>, highest: Vec<Value>) -> KeysetPage {
    KeysetPage {
        first_result: 10,
        max_results: 10,
        lowest: Keyset(lowest),
        highest: Keyset(highest),
    }
}

/// ORDER BY d.name ASC NULLS LAST, d.id ASC
fn by_name_then_id(mm: &StaticMetamodel, config: QueryConfig) -> CriteriaBuilder<'_> {
    let mut cb = CriteriaBuilder::new(mm, config);
    cb.from("Document", "d")
        .unwrap()
        .order_by_asc("d.name")
        .unwrap()
        .order_by_asc("d.id")
        .unwrap();
    cb
}

fn where_clause(text: &str) -> &str {
    let start = text.find("WHERE ").map(|i| i + 6).unwrap_or(text.len());
    let end = text.find(" ORDER BY").unwrap_or(text.len());
    &text[start..end]
}

#[test]
fn test_nullable_key_falls_back_to_nested_form() {
    let mm = common::metamodel();
    let cb = by_name_then_id(&mm, common::h2());
    let previous = page(
        vec![Value::from("a"), Value::from(1)],
        vec![Value::from("b"), Value::from(5)],
    );
    let next = cb.page_keyset(&previous, 20, 10).unwrap();
    assert_eq!(
        where_clause(&next.object.text),
        "((d.name > :_keysetParameter_0 OR d.name IS NULL) \
         OR (d.name = :_keysetParameter_0 AND d.id > :_keysetParameter_1))"
    );
}

#[test]
fn test_null_value_is_not_bound() {
    let mm = common::metamodel();
    let cb = by_name_then_id(&mm, common::h2());
    let previous = page(
        vec![Value::Null, Value::from(1)],
        vec![Value::Null, Value::from(5)],
    );
    let next = cb.page_keyset(&previous, 20, 10).unwrap();
    assert_eq!(
        where_clause(&next.object.text),
        "(d.name IS NULL AND d.id > :_keysetParameter_1)"
    );
    let names: Vec<&str> = next.object.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["_keysetParameter_1"]);
    assert_eq!(next.object.parameters[0].value, Some(Value::from(5)));
}

#[test]
fn test_previous_page_from_null_key() {
    let mm = common::metamodel();
    let cb = by_name_then_id(&mm, common::h2());
    let previous = page(
        vec![Value::Null, Value::from(5)],
        vec![Value::Null, Value::from(9)],
    );
    let back = cb.page_keyset(&previous, 0, 10).unwrap();
    assert_eq!(back.keyset_mode, Some(KeysetMode::Previous));
    assert_eq!(
        where_clause(&back.object.text),
        "(d.name IS NOT NULL OR (d.name IS NULL AND d.id < :_keysetParameter_1))"
    );
    assert!(back
        .object
        .text
        .ends_with("ORDER BY d.name DESC NULLS FIRST, d.id DESC NULLS FIRST LIMIT 10"));
}

#[test]
fn test_single_null_key() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap().order_by_asc("d.name").unwrap();
    let previous = page(vec![Value::Null], vec![Value::Null]);

    let next = cb.page_keyset(&previous, 20, 10).unwrap();
    assert_eq!(where_clause(&next.object.text), "1 = 0");

    let same = cb.page_keyset(&previous, 10, 10).unwrap();
    assert_eq!(where_clause(&same.object.text), "d.name IS NULL");
}

#[test]
fn test_nulls_first_key() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .order_by("d.name", true, true)
        .unwrap();
    let previous = page(vec![Value::from("a")], vec![Value::from("b")]);
    let next = cb.page_keyset(&previous, 20, 10).unwrap();
    assert_eq!(where_clause(&next.object.text), "d.name > :_keysetParameter_0");
}

#[test]
fn test_emulated_null_precedence() {
    let mm = common::metamodel();
    let cb = by_name_then_id(&mm, common::config(Dialect::MySql));
    let previous = page(
        vec![Value::from("a"), Value::from(1)],
        vec![Value::from("b"), Value::from(5)],
    );
    let next = cb.page_keyset(&previous, 20, 10).unwrap();
    assert!(next.object.text.ends_with(
        "ORDER BY CASE WHEN d.name IS NULL THEN 1 ELSE 0 END, d.name ASC, d.id ASC LIMIT 10"
    ));
}
