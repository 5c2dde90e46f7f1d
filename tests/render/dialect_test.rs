//! Tests that the target dialect only switches capabilities and never
//! rewrites the query text itself.

#[path = "../common/mod.rs"]
mod common;

use criteria::sql::dialect::Dialect;
use criteria::CriteriaBuilder;

fn query(dialect: Dialect) -> String {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::config(dialect));
    cb.from("Document", "d")
        .unwrap()
        .select("LENGTH(d.name)")
        .unwrap()
        .where_expression("d.name = 'Zoë' AND SUBSTR(d.name, 1, 2) = 'O''Brien'")
        .unwrap();
    cb.query_string().unwrap()
}

#[test]
fn test_tsql_keeps_functions_and_unicode_strings_verbatim() {
    assert_eq!(
        query(Dialect::TSql),
        "SELECT LENGTH(d.name) FROM Document d WHERE d.name = 'Zoë' AND SUBSTR(d.name, 1, 2) = 'O''Brien'"
    );
}

#[test]
fn test_every_dialect_renders_the_same_text() {
    let expected = query(Dialect::H2);
    for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::TSql, Dialect::DuckDb] {
        assert_eq!(query(dialect), expected, "{}", dialect);
    }
}
