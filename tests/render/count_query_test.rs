//! Tests for count queries and offset pagination.

#[path = "../common/mod.rs"]
mod common;

use criteria::sql::dialect::Dialect;
use criteria::{CriteriaBuilder, QueryError};

#[test]
fn test_count_drops_unused_implicit_joins() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.owner.name")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .gt(18)
        .unwrap()
        .order_by_asc("d.parent.name")
        .unwrap();
    assert_eq!(
        cb.count_statement().unwrap().text,
        "SELECT COUNT(*) FROM Document d WHERE d.age > :param_0"
    );
    assert_eq!(
        cb.root_count_statement().unwrap().text,
        "SELECT COUNT(DISTINCT d.id) FROM Document d WHERE d.age > :param_0"
    );
}

#[test]
fn test_count_keeps_filtering_joins_and_their_parents() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.partners.name")
        .unwrap()
        .where_("d.parent.owner.name")
        .unwrap()
        .eq("x")
        .unwrap();
    assert_eq!(
        cb.count_statement().unwrap().text,
        "SELECT COUNT(*) FROM Document d LEFT JOIN d.parent parent_1 \
         LEFT JOIN parent_1.owner owner_1 WHERE owner_1.name = :param_0"
    );
}

#[test]
fn test_count_keeps_explicit_inner_joins() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .inner_join("d.partners", "p")
        .unwrap()
        .left_join("d.people", "pe")
        .unwrap();
    assert_eq!(
        cb.count_statement().unwrap().text,
        "SELECT COUNT(*) FROM Document d JOIN d.partners p"
    );
}

#[test]
fn test_count_over_group_by() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap().group_by("d.name").unwrap();
    assert_eq!(
        cb.count_statement().unwrap().text,
        "SELECT COUNT(DISTINCT d.name) FROM Document d"
    );

    cb.group_by("d.age").unwrap();
    assert_eq!(
        cb.count_statement().unwrap().text,
        "SELECT COUNT_TUPLE('DISTINCT', d.name, d.age) FROM Document d"
    );
}

#[test]
fn test_count_tuple_needs_capability() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::config(Dialect::MySql));
    cb.from("Document", "d")
        .unwrap()
        .group_by("d.name")
        .unwrap()
        .group_by("d.age")
        .unwrap();
    assert!(matches!(
        cb.count_statement(),
        Err(QueryError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_count_with_having_is_unsupported() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .select("d.name")
        .unwrap()
        .select("COUNT(d.id)")
        .unwrap()
        .having_expression("COUNT(d.id) > 1")
        .unwrap();
    assert!(matches!(
        cb.count_statement(),
        Err(QueryError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_offset_page() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_("d.owner.name")
        .unwrap()
        .like("A%")
        .unwrap()
        .order_by_asc("d.id")
        .unwrap();
    let page = cb.page(20, 10).unwrap();
    assert_eq!(page.keyset_mode, None);
    assert!(!page.reversed);
    assert_eq!(
        page.object.text,
        "SELECT d FROM Document d JOIN d.owner owner_1 WHERE owner_1.name LIKE :param_0 \
         ORDER BY d.id ASC NULLS LAST LIMIT 10 OFFSET 20"
    );
    assert_eq!(
        page.count.text,
        "SELECT COUNT(*) FROM Document d JOIN d.owner owner_1 WHERE owner_1.name LIKE :param_0"
    );
    assert_eq!(
        page.root_count.text,
        "SELECT COUNT(DISTINCT d.id) FROM Document d JOIN d.owner owner_1 WHERE owner_1.name LIKE :param_0"
    );
    assert_eq!(page.count.parameters, page.root_count.parameters);

    let first = cb.page(0, 10).unwrap();
    assert!(first.object.text.ends_with("LIMIT 10"));
}

#[test]
fn test_count_needs_select() {
    let mm = common::metamodel();
    let cb = CriteriaBuilder::delete(&mm, common::h2(), "Document", "d").unwrap();
    assert!(matches!(
        cb.count_statement(),
        Err(QueryError::InvalidArgument(_))
    ));
}
