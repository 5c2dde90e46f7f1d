//! Tests for UPDATE, DELETE and INSERT ... SELECT statements.

#[path = "../common/mod.rs"]
mod common;

use criteria::{CriteriaBuilder, QueryError};
use serde_json::Value;

#[test]
fn test_update() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::update(&mm, common::h2(), "Document", "d").unwrap();
    cb.set("name", "renamed")
        .unwrap()
        .set_expression("age", "d.owner.age")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .gt(18)
        .unwrap();
    let statement = cb.statement().unwrap();
    assert_eq!(
        statement.text,
        "UPDATE Document d SET d.name = :param_0, d.age = d.owner.age WHERE d.age > :param_1"
    );
    assert_eq!(
        statement.parameter("param_0").unwrap().value,
        Some(Value::from("renamed"))
    );
}

#[test]
fn test_update_needs_set_clause() {
    let mm = common::metamodel();
    let cb = CriteriaBuilder::update(&mm, common::h2(), "Document", "d").unwrap();
    assert!(matches!(cb.statement(), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn test_dml_rejects_collection_paths() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::delete(&mm, common::h2(), "Document", "d").unwrap();
    assert!(matches!(
        cb.where_expression("d.partners.name = 'x'"),
        Err(QueryError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        cb.where_expression("TREAT(d.owner AS Employee).salary > 1"),
        Err(QueryError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_delete_keeps_association_paths() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::delete(&mm, common::h2(), "Document", "d").unwrap();
    cb.where_("d.owner.name").unwrap().eq("x").unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "DELETE FROM Document d WHERE d.owner.name = :param_0"
    );
    assert_eq!(cb.model().graph.len(), 1);
}

#[test]
fn test_dml_builders_reject_select_calls() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::update(&mm, common::h2(), "Document", "d").unwrap();
    assert!(matches!(cb.from("Person", "p"), Err(QueryError::InvalidArgument(_))));
    assert!(matches!(cb.select("d.name"), Err(QueryError::InvalidArgument(_))));
    assert!(matches!(cb.order_by_asc("d.name"), Err(QueryError::InvalidArgument(_))));
    assert!(matches!(
        CriteriaBuilder::update(&mm, common::h2(), "Nothing", "n").err(),
        Some(QueryError::UnknownType(_))
    ));
}

#[test]
fn test_insert_select() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::insert(&mm, common::h2(), "Document").unwrap();
    cb.from("Person", "p")
        .unwrap()
        .bind("name", "p.name")
        .unwrap()
        .bind("age", "p.age")
        .unwrap()
        .where_("p.age")
        .unwrap()
        .gt(18)
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "INSERT INTO Document(name, age)\nSELECT p.name, p.age FROM Person p WHERE p.age > :param_0"
    );
}

#[test]
fn test_insert_bindings_are_checked() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::insert(&mm, common::h2(), "Document").unwrap();
    cb.from("Person", "p").unwrap();
    assert!(matches!(cb.statement(), Err(QueryError::InvalidArgument(_))));
    assert_eq!(
        cb.bind("title", "p.name").err(),
        Some(QueryError::unknown_attribute("Document", "title"))
    );
    cb.bind("name", "p.name").unwrap();
    assert!(matches!(cb.bind("name", "p.name"), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn test_insert_never_infers_group_by() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::insert(&mm, common::h2(), "Document").unwrap();
    cb.from("Person", "p")
        .unwrap()
        .bind("age", "MAX(p.age)")
        .unwrap()
        .bind("name", "p.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "INSERT INTO Document(age, name)\nSELECT MAX(p.age), p.name FROM Person p"
    );
}
