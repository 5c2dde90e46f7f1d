//! Tests for keyset pagination over non-null keys.

#[path = "../common/mod.rs"]
mod common;

use criteria::config::QueryConfig;
use criteria::keyset::{Keyset, KeysetMode, KeysetPage};
use criteria::metadata::StaticMetamodel;
use criteria::sql::dialect::Dialect;
use criteria::{CriteriaBuilder, QueryError};
use serde_json::Value;

fn previous_page() -> KeysetPage {
    KeysetPage {
        first_result: 10,
        max_results: 10,
        lowest: Keyset::new([3, 30]),
        highest: Keyset::new([7, 70]),
    }
}

fn builder(mm: &StaticMetamodel, config: QueryConfig) -> CriteriaBuilder<'_> {
    let mut cb = CriteriaBuilder::new(mm, config);
    cb.from("Document", "d")
        .unwrap()
        .order_by_asc("d.owner.id")
        .unwrap()
        .order_by_asc("d.id")
        .unwrap();
    cb
}

#[test]
fn test_next_page_uses_row_value_comparison() {
    let mm = common::metamodel();
    let cb = builder(&mm, common::h2());
    let page = cb.page_keyset(&previous_page(), 20, 10).unwrap();
    assert_eq!(page.keyset_mode, Some(KeysetMode::Next));
    assert!(!page.reversed);
    assert_eq!(
        page.object.text,
        "SELECT d FROM Document d JOIN d.owner owner_1 \
         WHERE (owner_1.id, d.id) > (:_keysetParameter_0, :_keysetParameter_1) \
         ORDER BY owner_1.id ASC NULLS LAST, d.id ASC NULLS LAST LIMIT 10"
    );
    assert_eq!(
        page.object.parameter("_keysetParameter_0").unwrap().value,
        Some(Value::from(7))
    );
    assert_eq!(
        page.object.parameter("_keysetParameter_1").unwrap().value,
        Some(Value::from(70))
    );
}

#[test]
fn test_previous_page_reverses_order() {
    let mm = common::metamodel();
    let cb = builder(&mm, common::h2());
    let page = cb.page_keyset(&previous_page(), 0, 10).unwrap();
    assert_eq!(page.keyset_mode, Some(KeysetMode::Previous));
    assert!(page.reversed);
    assert_eq!(
        page.object.text,
        "SELECT d FROM Document d JOIN d.owner owner_1 \
         WHERE (:_keysetParameter_0, :_keysetParameter_1) > (owner_1.id, d.id) \
         ORDER BY owner_1.id DESC NULLS FIRST, d.id DESC NULLS FIRST LIMIT 10"
    );
    assert_eq!(
        page.object.parameter("_keysetParameter_0").unwrap().value,
        Some(Value::from(3))
    );
}

#[test]
fn test_same_page_is_inclusive() {
    let mm = common::metamodel();
    let cb = builder(&mm, common::h2());
    let page = cb.page_keyset(&previous_page(), 10, 10).unwrap();
    assert_eq!(page.keyset_mode, Some(KeysetMode::Same));
    assert!(page
        .object
        .text
        .contains("WHERE (owner_1.id, d.id) >= (:_keysetParameter_0, :_keysetParameter_1)"));
}

#[test]
fn test_keyset_joins_existing_restrictions() {
    let mm = common::metamodel();
    let mut cb = builder(&mm, common::h2());
    cb.where_("d.age").unwrap().gt(18).unwrap();
    let page = cb.page_keyset(&previous_page(), 20, 10).unwrap();
    assert!(page.object.text.contains(
        "WHERE d.age > :param_0 AND (owner_1.id, d.id) > (:_keysetParameter_0, :_keysetParameter_1)"
    ));
    let names: Vec<&str> = page.object.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["param_0", "_keysetParameter_0", "_keysetParameter_1"]);
    assert_eq!(page.count.text, "SELECT COUNT(*) FROM Document d WHERE d.age > :param_0");
}

#[test]
fn test_nested_form_without_row_values() {
    let mm = common::metamodel();
    let cb = builder(&mm, common::config(Dialect::TSql));
    let page = cb.page_keyset(&previous_page(), 20, 10).unwrap();
    assert_eq!(
        page.object.text,
        "SELECT d FROM Document d JOIN d.owner owner_1 \
         WHERE (owner_1.id > :_keysetParameter_0 OR (owner_1.id = :_keysetParameter_0 AND d.id > :_keysetParameter_1)) \
         ORDER BY owner_1.id ASC, d.id ASC OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

#[test]
fn test_nested_form_when_optimization_is_off() {
    let mm = common::metamodel();
    let config = QueryConfig {
        optimized_keyset: false,
        ..common::h2()
    };
    let cb = builder(&mm, config);
    let page = cb.page_keyset(&previous_page(), 0, 10).unwrap();
    assert!(page.object.text.contains(
        "WHERE (owner_1.id < :_keysetParameter_0 OR (owner_1.id = :_keysetParameter_0 AND d.id < :_keysetParameter_1))"
    ));
}

#[test]
fn test_non_adjacent_page_uses_offset() {
    let mm = common::metamodel();
    let cb = builder(&mm, common::h2());
    let page = cb.page_keyset(&previous_page(), 40, 10).unwrap();
    assert_eq!(page.keyset_mode, None);
    assert!(page.object.text.ends_with("LIMIT 10 OFFSET 40"));
    assert!(page.object.parameters.is_empty());

    let resized = cb.page_keyset(&previous_page(), 20, 5).unwrap();
    assert_eq!(resized.keyset_mode, None);
    assert!(resized.object.text.ends_with("LIMIT 5 OFFSET 20"));
}

#[test]
fn test_keyset_needs_order_by() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.page_keyset(&previous_page(), 20, 10),
        Err(QueryError::InvalidArgument(_))
    ));
}

#[test]
fn test_keyset_page_from_json() {
    let page: KeysetPage = serde_json::from_str(
        r#"{"first_result": 10, "max_results": 10, "lowest": [3, 30], "highest": [7, 70]}"#,
    )
    .unwrap();
    assert_eq!(page, previous_page());
}
