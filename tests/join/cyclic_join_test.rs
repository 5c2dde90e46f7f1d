//! Tests for ON clauses that depend on joins of their own join node.

#[path = "../common/mod.rs"]
mod common;

use criteria::{CriteriaBuilder, QueryError};

#[test]
fn test_acyclic_predicate_stays_in_on_clause() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.partners[_.name = 'x'].age")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT partners_1.age FROM Document d LEFT JOIN d.partners partners_1 ON partners_1.name = 'x'"
    );
}

#[test]
fn test_cyclic_index_predicate_becomes_exists() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.partners[_.partnerDocument.name = 'x'].name")
        .unwrap();
    insta::assert_snapshot!(
        cb.query_string().unwrap(),
        @"SELECT partners_1.name FROM Document d LEFT JOIN d.partners partners_1 ON EXISTS (SELECT 1 FROM Person _synthetic_partners_1 LEFT JOIN _synthetic_partners_1.partnerDocument partnerDocument_1 WHERE partnerDocument_1.name = 'x' AND _synthetic_partners_1 = partners_1)"
    );
}

#[test]
fn test_cyclic_explicit_on_becomes_exists() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    cb.left_join_on("d.partners", "p")
        .unwrap()
        .on("p.friend.name")
        .unwrap()
        .eq("x")
        .unwrap()
        .end()
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT d FROM Document d LEFT JOIN d.partners p ON EXISTS (SELECT 1 \
         FROM Person _synthetic_p LEFT JOIN _synthetic_p.friend friend_1 \
         WHERE friend_1.name = :param_0 AND _synthetic_p = p)"
    );
    let statement = cb.statement().unwrap();
    assert_eq!(statement.parameters.len(), 1);
    assert_eq!(statement.parameters[0].name, "param_0");
}

#[test]
fn test_fallback_needs_entity_joins() {
    let mm = common::metamodel();
    let mut config = common::h2();
    config.capabilities.supports_entity_join = false;
    let mut cb = CriteriaBuilder::new(&mm, config);
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.select("d.partners[_.partnerDocument.name = 'x'].name"),
        Err(QueryError::UnsupportedOperation { .. })
    ));
    assert_eq!(cb.model().graph.len(), 1);
    assert_eq!(cb.query_string().unwrap(), "SELECT d FROM Document d");
}
