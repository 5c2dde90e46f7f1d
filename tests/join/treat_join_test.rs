//! Tests for TREAT joins on paths and on join aliases.

#[path = "../common/mod.rs"]
mod common;

use criteria::{CriteriaBuilder, QueryError};

#[test]
fn test_treat_path_joins_subtype() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("TREAT(d.owner AS Employee).salary")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT owner_1.salary FROM Document d JOIN TREAT(d.owner AS Employee) owner_1"
    );
}

#[test]
fn test_treated_and_untreated_joins_are_distinct() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.owner.name")
        .unwrap()
        .select("TREAT(d.owner AS Employee).salary")
        .unwrap()
        .where_("TREAT(d.owner AS Employee).salary")
        .unwrap()
        .gt(1000)
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT owner_1.name, owner_2.salary FROM Document d \
         JOIN d.owner owner_1 JOIN TREAT(d.owner AS Employee) owner_2 \
         WHERE owner_2.salary > :param_0"
    );
}

#[test]
fn test_treat_of_join_alias() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("d.owner", "o")
        .unwrap()
        .select("TREAT(o AS Employee).salary")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT TREAT(o AS Employee).salary FROM Document d JOIN d.owner o"
    );
    assert_eq!(cb.model().graph.len(), 2);
}

#[test]
fn test_treat_of_plural_join_alias_narrows_in_place() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .left_join("d.partners", "p")
        .unwrap()
        .select("TREAT(p AS Employee).salary")
        .unwrap()
        .where_("TREAT(p AS Employee).salary")
        .unwrap()
        .gt(1000)
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT TREAT(p AS Employee).salary FROM Document d LEFT JOIN d.partners p \
         WHERE TREAT(p AS Employee).salary > :param_0"
    );
    assert_eq!(cb.model().graph.len(), 2);
}

#[test]
fn test_selected_treated_alias_groups_by_subtype_attributes() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .left_join("d.partners", "p")
        .unwrap()
        .select("TREAT(p AS Employee)")
        .unwrap()
        .select("COUNT(d.id)")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT TREAT(p AS Employee), COUNT(d.id) FROM Document d LEFT JOIN d.partners p \
         GROUP BY TREAT(p AS Employee).age, TREAT(p AS Employee).id, \
         TREAT(p AS Employee).name, TREAT(p AS Employee).salary"
    );
}

#[test]
fn test_join_below_treated_alias() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("d.owner", "o")
        .unwrap()
        .select("TREAT(o AS Employee).friend.name")
        .unwrap()
        .select("o.friend.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT friend_1.name, friend_2.name FROM Document d JOIN d.owner o \
         LEFT JOIN TREAT(o AS Employee).friend friend_1 LEFT JOIN o.friend friend_2"
    );
}

#[test]
fn test_treat_of_alias_needs_a_subtype() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .left_join("d.partners", "p")
        .unwrap();
    assert!(matches!(
        cb.select("TREAT(p AS Document).name"),
        Err(QueryError::Syntax { .. })
    ));
    assert!(matches!(
        cb.select("TREAT(p AS Employee).title"),
        Err(QueryError::UnknownAttribute { .. })
    ));
    assert_eq!(cb.model().graph.len(), 2);
}

#[test]
fn test_explicit_treat_join() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("TREAT(d.owner AS Employee)", "e")
        .unwrap()
        .select("e.salary")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT e.salary FROM Document d JOIN TREAT(d.owner AS Employee) e"
    );
}

#[test]
fn test_invalid_treats_are_rejected() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.select("TREAT(d AS Employee).salary"),
        Err(QueryError::Syntax { .. })
    ));
    assert!(matches!(
        cb.select("TREAT(d.owner AS Document).name"),
        Err(QueryError::Syntax { .. })
    ));
    assert!(matches!(
        cb.select("TREAT(d.name AS Employee).salary"),
        Err(QueryError::Syntax { .. })
    ));
    assert!(matches!(
        cb.select("d.owner.salary"),
        Err(QueryError::UnknownAttribute { .. })
    ));
    assert_eq!(cb.model().graph.len(), 1);
}
