//! Tests for WITH and WITH RECURSIVE rendering.

#[path = "../common/mod.rs"]
mod common;

use criteria::sql::dialect::Dialect;
use criteria::{CriteriaBuilder, QueryError};
use serde_json::Value;

#[test]
fn test_simple_cte() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.with_cte("DocumentCte")
        .unwrap()
        .from("Document", "d")
        .unwrap()
        .bind("id", "d.id")
        .unwrap()
        .bind("name", "d.name")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .gt(18)
        .unwrap()
        .end()
        .unwrap()
        .from("DocumentCte", "c")
        .unwrap()
        .select("c.name")
        .unwrap();
    let statement = cb.statement().unwrap();
    assert_eq!(
        statement.text,
        "WITH DocumentCte(id, name) AS(\n\
         SELECT d.id, d.name FROM Document d WHERE d.age > :param_0\n\
         )\n\
         SELECT c.name FROM DocumentCte c"
    );
    assert_eq!(statement.parameter("param_0").unwrap().value, Some(Value::from(18)));
}

fn recursive(dialect: Dialect) -> String {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::config(dialect));
    cb.with_recursive_cte("DocumentCte")
        .unwrap()
        .from("Document", "d")
        .unwrap()
        .bind("id", "d.id")
        .unwrap()
        .bind("name", "d.name")
        .unwrap()
        .bind("parentId", "d.parent.id")
        .unwrap()
        .where_("d.parent")
        .unwrap()
        .is_null()
        .unwrap()
        .union_all()
        .unwrap()
        .from("Document", "d2")
        .unwrap()
        .from("DocumentCte", "c")
        .unwrap()
        .bind("id", "d2.id")
        .unwrap()
        .bind("name", "d2.name")
        .unwrap()
        .bind("parentId", "d2.parent.id")
        .unwrap()
        .where_expression("d2.parent.id = c.id")
        .unwrap()
        .end()
        .unwrap()
        .from("DocumentCte", "c")
        .unwrap()
        .select("c.name")
        .unwrap();
    cb.query_string().unwrap()
}

#[test]
fn test_recursive_cte() {
    insta::assert_snapshot!(recursive(Dialect::H2), @r"
    WITH RECURSIVE DocumentCte(id, name, parentId) AS(
    SELECT d.id, d.name, parent_1.id FROM Document d LEFT JOIN d.parent parent_1 WHERE parent_1 IS NULL
    UNION ALL
    SELECT d2.id, d2.name, parent_1.id FROM Document d2, DocumentCte c LEFT JOIN d2.parent parent_1 WHERE parent_1.id = c.id
    )
    SELECT c.name FROM DocumentCte c
    ");
}

#[test]
fn test_recursive_keyword_is_dialect_specific() {
    assert!(recursive(Dialect::TSql).starts_with("WITH DocumentCte(id, name, parentId) AS(\n"));
}

#[test]
fn test_dml_cte_with_returning() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::config(Dialect::Postgres));
    cb.with_cte("DocumentCte")
        .unwrap()
        .delete_from("Document", "d")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .lt(18)
        .unwrap()
        .returning("id", "d.id")
        .unwrap()
        .returning("name", "d.name")
        .unwrap()
        .end()
        .unwrap()
        .from("DocumentCte", "c")
        .unwrap()
        .select("c.id")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "WITH DocumentCte(id, name) AS(\n\
         DELETE FROM Document d WHERE d.age < :param_0 RETURNING d.id, d.name\n\
         )\n\
         SELECT c.id FROM DocumentCte c"
    );
}

#[test]
fn test_cte_definitions_are_checked() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    assert!(matches!(cb.with_cte("Document"), Err(QueryError::InvalidArgument(_))));

    {
        let mut cte = cb.with_cte("DocumentCte").unwrap();
        cte.from("Document", "d").unwrap();
        assert!(matches!(
            cte.bind("title", "d.name"),
            Err(QueryError::UnknownAttribute { .. })
        ));
        assert!(matches!(cte.end(), Err(QueryError::InvalidArgument(_))));
        cte.bind("id", "d.id").unwrap();
        assert!(matches!(cte.bind("id", "d.id"), Err(QueryError::InvalidArgument(_))));
        cte.end().unwrap();
    }
    assert!(matches!(cb.with_cte("DocumentCte"), Err(QueryError::InvalidArgument(_))));
}
