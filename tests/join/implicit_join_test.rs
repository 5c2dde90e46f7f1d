//! Tests for implicit join materialization from attribute paths.

#[path = "../common/mod.rs"]
mod common;

use criteria::config::QueryConfig;
use criteria::metadata::StaticMetamodel;
use criteria::{CriteriaBuilder, QueryError};

fn select(mm: &StaticMetamodel, config: QueryConfig, expression: &str) -> String {
    let mut cb = CriteriaBuilder::new(mm, config);
    cb.from("Document", "d").unwrap().select(expression).unwrap();
    cb.query_string().unwrap()
}

#[test]
fn test_required_association_joins_inner() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.owner.name"),
        "SELECT owner_1.name FROM Document d JOIN d.owner owner_1"
    );
}

#[test]
fn test_optional_association_joins_left() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.parent.name"),
        "SELECT parent_1.name FROM Document d LEFT JOIN d.parent parent_1"
    );
}

#[test]
fn test_left_join_propagates_to_required_children() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.parent.owner.name"),
        "SELECT owner_1.name FROM Document d LEFT JOIN d.parent parent_1 LEFT JOIN parent_1.owner owner_1"
    );
}

#[test]
fn test_embeddable_path_needs_no_join() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.nameObject.primaryName"),
        "SELECT d.nameObject.primaryName FROM Document d"
    );
}

#[test]
fn test_nested_index_accessors() {
    let mm = common::metamodel();
    insta::assert_snapshot!(
        select(&mm, common::h2(), "d.contacts[:age].localized[d.idx]"),
        @"SELECT localized_d_idx_1 FROM Document d LEFT JOIN d.contacts contacts_age_1 ON KEY(contacts_age_1) = :age LEFT JOIN contacts_age_1.localized localized_d_idx_1 ON KEY(localized_d_idx_1) = d.idx"
    );
}

#[test]
fn test_list_index_uses_index_function() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.people[1].name"),
        "SELECT people_1_1.name FROM Document d LEFT JOIN d.people people_1_1 ON INDEX(people_1_1) = 1"
    );
}

#[test]
fn test_equivalent_paths_share_one_join() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.owner.name")
        .unwrap()
        .where_("d.owner.age")
        .unwrap()
        .gt(18)
        .unwrap()
        .order_by_asc("d.owner.id")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT owner_1.name FROM Document d JOIN d.owner owner_1 \
         WHERE owner_1.age > :param_0 ORDER BY owner_1.id ASC NULLS LAST"
    );
}

#[test]
fn test_root_relative_path() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "owner.name"),
        "SELECT owner_1.name FROM Document d JOIN d.owner owner_1"
    );
}

#[test]
fn test_entity_name_becomes_implicit_root() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_expression("Person.name = d.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT d FROM Document d, Person person_1 WHERE person_1.name = d.name"
    );
}

#[test]
fn test_id_access_without_join() {
    let mm = common::metamodel();
    assert_eq!(
        select(&mm, common::h2(), "d.owner.id"),
        "SELECT owner_1.id FROM Document d JOIN d.owner owner_1"
    );
    let config = QueryConfig {
        id_access_without_join: true,
        ..common::h2()
    };
    assert_eq!(select(&mm, config, "d.owner.id"), "SELECT d.owner.id FROM Document d");
}

#[test]
fn test_unknown_attribute_leaves_no_joins() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    assert_eq!(
        cb.select("d.owner.nme").err(),
        Some(QueryError::unknown_attribute("Person", "nme"))
    );
    assert_eq!(cb.model().graph.len(), 1);
}

#[test]
fn test_ambiguous_root() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap().from("Person", "p").unwrap();
    assert_eq!(
        cb.where_expression("name = 'x'").err(),
        Some(QueryError::AmbiguousRoot {
            identifier: "name".into(),
            candidates: vec!["d".into(), "p".into()],
        })
    );
}

#[test]
fn test_aliases_are_deterministic() {
    let mm = common::metamodel();
    let build = || {
        let mut cb = CriteriaBuilder::new(&mm, common::h2());
        cb.from("Document", "d")
            .unwrap()
            .select("d.partners.name")
            .unwrap()
            .select("d.owner.partnerDocument.name")
            .unwrap()
            .select("d.contacts[2].name")
            .unwrap();
        cb.query_string().unwrap()
    };
    let first = build();
    assert_eq!(first, build());
    assert_eq!(
        first,
        "SELECT partners_1.name, partnerDocument_1.name, contacts_2_1.name FROM Document d \
         LEFT JOIN d.partners partners_1 JOIN d.owner owner_1 \
         LEFT JOIN owner_1.partnerDocument partnerDocument_1 \
         LEFT JOIN d.contacts contacts_2_1 ON KEY(contacts_2_1) = 2"
    );
}
