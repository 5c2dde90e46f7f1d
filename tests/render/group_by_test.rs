//! Tests for implicit GROUP BY inference and the SIZE rewrite.

#[path = "../common/mod.rs"]
mod common;

use criteria::config::QueryConfig;
use criteria::metadata::StaticMetamodel;
use criteria::sql::dialect::Dialect;
use criteria::CriteriaBuilder;

fn query(mm: &StaticMetamodel, config: QueryConfig, select: &[&str]) -> String {
    let mut cb = CriteriaBuilder::new(mm, config);
    cb.from("Document", "d").unwrap();
    for item in select {
        cb.select(item).unwrap();
    }
    cb.query_string().unwrap()
}

#[test]
fn test_non_aggregated_items_are_grouped() {
    let mm = common::metamodel();
    assert_eq!(
        query(&mm, common::h2(), &["d.name", "COUNT(d.id)"]),
        "SELECT d.name, COUNT(d.id) FROM Document d GROUP BY d.name"
    );
    assert_eq!(
        query(&mm, common::h2(), &["d.name || MAX(d.age)"]),
        "SELECT d.name || MAX(d.age) FROM Document d GROUP BY d.name"
    );
}

#[test]
fn test_no_group_by_without_aggregates() {
    let mm = common::metamodel();
    assert_eq!(
        query(&mm, common::h2(), &["d.name", "d.age"]),
        "SELECT d.name, d.age FROM Document d"
    );
    let config = QueryConfig {
        implicit_group_by: false,
        ..common::h2()
    };
    assert_eq!(
        query(&mm, config, &["d.name", "COUNT(d.id)"]),
        "SELECT d.name, COUNT(d.id) FROM Document d"
    );
}

#[test]
fn test_selected_entity_groups_by_its_basic_attributes() {
    let mm = common::metamodel();
    assert_eq!(
        query(&mm, common::h2(), &["d.owner", "COUNT(d.id)"]),
        "SELECT owner_1, COUNT(d.id) FROM Document d JOIN d.owner owner_1 \
         GROUP BY owner_1.age, owner_1.id, owner_1.name"
    );
}

#[test]
fn test_order_by_items_are_grouped() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("COUNT(d.id)")
        .unwrap()
        .order_by_asc("d.name")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT COUNT(d.id) FROM Document d GROUP BY d.name ORDER BY d.name ASC NULLS LAST"
    );
}

#[test]
fn test_explicit_group_by_and_having() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.owner.name")
        .unwrap()
        .select("COUNT(d.id)")
        .unwrap()
        .group_by("d.owner.name")
        .unwrap()
        .having("COUNT(d.id)")
        .unwrap()
        .gt(1)
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT owner_1.name, COUNT(d.id) FROM Document d JOIN d.owner owner_1 \
         GROUP BY owner_1.name HAVING COUNT(d.id) > :param_0"
    );
}

#[test]
fn test_registered_aggregate() {
    let mm = common::metamodel();
    let mut config = common::h2();
    config.functions.register_aggregate("group_concat");
    assert_eq!(
        query(&mm, config, &["d.owner.name", "FUNCTION('group_concat', d.name)"]),
        "SELECT owner_1.name, GROUP_CONCAT(d.name) FROM Document d JOIN d.owner owner_1 GROUP BY owner_1.name"
    );
}

#[test]
fn test_size_becomes_grouped_count() {
    let mm = common::metamodel();
    insta::assert_snapshot!(
        query(&mm, common::h2(), &["d.name", "SIZE(d.partners)"]),
        @"SELECT d.name, COUNT_TUPLE(partners_1.id) FROM Document d LEFT JOIN d.partners partners_1 GROUP BY d.id, d.name"
    );
    assert_eq!(
        query(&mm, common::config(Dialect::DuckDb), &["d.name", "SIZE(d.partners)"]),
        "SELECT d.name, COUNT(partners_1.id) FROM Document d LEFT JOIN d.partners partners_1 GROUP BY d.id, d.name"
    );
}

#[test]
fn test_size_counts_distinct_next_to_other_collections() {
    let mm = common::metamodel();
    assert_eq!(
        query(&mm, common::config(Dialect::DuckDb), &["SIZE(d.partners)", "SIZE(d.contacts)"]),
        "SELECT COUNT(DISTINCT partners_1.id), COUNT(DISTINCT KEY(contacts_1)) FROM Document d \
         LEFT JOIN d.partners partners_1 LEFT JOIN d.contacts contacts_1 GROUP BY d.id"
    );
}

#[test]
fn test_size_falls_back_to_subquery() {
    let mm = common::metamodel();
    assert_eq!(
        query(&mm, common::h2(), &["d.name", "SIZE(d.tags)"]),
        "SELECT d.name, (SELECT COUNT(*) FROM d.tags string) FROM Document d"
    );
    assert_eq!(
        query(&mm, common::h2(), &["MAX(SIZE(d.partners))"]),
        "SELECT MAX((SELECT COUNT(*) FROM d.partners person)) FROM Document d"
    );
    let config = QueryConfig {
        size_to_count: false,
        ..common::h2()
    };
    assert_eq!(
        query(&mm, config, &["SIZE(d.people)"]),
        "SELECT (SELECT COUNT(*) FROM d.people person) FROM Document d"
    );
}

#[test]
fn test_size_outside_select_is_kept() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_expression("SIZE(d.partners) > 1")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT d FROM Document d WHERE SIZE(d.partners) > 1"
    );
}

#[test]
fn test_window_function_is_not_grouped() {
    let mm = common::metamodel();
    assert_eq!(
        query(
            &mm,
            common::h2(),
            &["d.name", "SUM(d.age) OVER (PARTITION BY d.owner.name ORDER BY d.id DESC)"]
        ),
        "SELECT d.name, SUM(d.age) OVER (PARTITION BY owner_1.name ORDER BY d.id DESC) \
         FROM Document d JOIN d.owner owner_1"
    );
}

#[test]
fn test_window_function_needs_capability() {
    let mm = common::metamodel();
    let mut config = common::h2();
    config.capabilities.supports_window_functions = false;
    let mut cb = CriteriaBuilder::new(&mm, config);
    cb.from("Document", "d").unwrap();
    assert!(matches!(
        cb.select("SUM(d.age) OVER (ORDER BY d.id)"),
        Err(criteria::QueryError::UnsupportedOperation { .. })
    ));
    assert_eq!(cb.model().graph.len(), 1);
}
