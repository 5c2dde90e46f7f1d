//! Tests for explicit joins, join promotion and ad-hoc entity joins.

#[path = "../common/mod.rs"]
mod common;

use criteria::config::QueryConfig;
use criteria::join::JoinType;
use criteria::{CriteriaBuilder, QueryError};

#[test]
fn test_explicit_join_alias_is_usable() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .left_join("d.partners", "p")
        .unwrap()
        .select("p.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT p.name FROM Document d LEFT JOIN d.partners p"
    );
}

#[test]
fn test_joins_off_an_explicit_alias() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("d.owner", "o")
        .unwrap()
        .left_join("o.partnerDocument", "pd")
        .unwrap()
        .select("pd.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT pd.name FROM Document d JOIN d.owner o LEFT JOIN o.partnerDocument pd"
    );
}

#[test]
fn test_implicit_join_is_promoted() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.owner.name")
        .unwrap()
        .inner_join("d.owner", "o")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT o.name FROM Document d JOIN d.owner o"
    );
    assert_eq!(cb.model().graph.len(), 2);
}

#[test]
fn test_later_paths_reuse_explicit_join() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("d.owner", "o")
        .unwrap()
        .select("d.owner.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT o.name FROM Document d JOIN d.owner o"
    );
}

#[test]
fn test_promotion_with_other_join_type_is_rejected() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap().select("d.owner.name").unwrap();
    assert!(matches!(
        cb.left_join("d.owner", "o"),
        Err(QueryError::IllegalJoinOverride { alias, .. }) if alias == "o"
    ));
}

#[test]
fn test_alias_in_use_is_rejected() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.left_join("d.partners", "d"),
        Err(QueryError::IllegalJoinOverride { .. })
    ));
    assert!(matches!(
        cb.left_join("d.name", "n"),
        Err(QueryError::InvalidArgument(_))
    ));
}

#[test]
fn test_indexed_explicit_join() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .left_join("d.contacts[1]", "c")
        .unwrap()
        .select("c.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT c.name FROM Document d LEFT JOIN d.contacts c ON KEY(c) = 1"
    );
}

#[test]
fn test_join_with_on_is_never_shared() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    cb.left_join_on("d.partners", "p")
        .unwrap()
        .on("p.age")
        .unwrap()
        .gt(18)
        .unwrap()
        .end()
        .unwrap()
        .select("d.partners.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT partners_1.name FROM Document d \
         LEFT JOIN d.partners p ON p.age > :param_0 LEFT JOIN d.partners partners_1"
    );
}

#[test]
fn test_empty_on_clause_is_rejected() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    let mut on = cb.left_join_on("d.partners", "p").unwrap();
    assert!(matches!(on.end(), Err(QueryError::InvalidArgument(_))));
}

#[test]
fn test_failed_on_clause_keeps_its_predicates() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    let mut on = cb.left_join_on("d.partners", "p").unwrap();
    on.on_expression("p.age > 18")
        .unwrap()
        .on_expression("p.title = 'x'")
        .unwrap();
    assert!(matches!(on.end(), Err(QueryError::UnknownAttribute { .. })));
    assert!(matches!(on.end(), Err(QueryError::UnknownAttribute { .. })));
    drop(on);
    assert_eq!(cb.model().graph.len(), 2);
}

#[test]
fn test_entity_join() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    cb.join_on_entity("Person", "p", JoinType::Left)
        .unwrap()
        .on("p.name")
        .unwrap()
        .eq_expression("d.name")
        .unwrap()
        .end()
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT d FROM Document d LEFT JOIN Person p ON p.name = d.name"
    );
}

#[test]
fn test_entity_join_needs_capability() {
    let mm = common::metamodel();
    let mut config = common::h2();
    config.capabilities.supports_entity_join = false;
    let mut cb = CriteriaBuilder::new(&mm, config);
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.join_on_entity("Person", "p", JoinType::Inner).err(),
        Some(QueryError::UnsupportedOperation { .. })
    ));
    let _: &QueryConfig = cb.config();
    assert_eq!(cb.model().graph.len(), 1);
}
