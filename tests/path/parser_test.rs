//! Tests for the path expression grammar.

use criteria::path::{parse, parse_path, IndexAccessor};
use criteria::sql::expr::{BinaryOperator, Expr};
use criteria::QueryError;

fn roundtrip(source: &str) -> String {
    parse(source).expect("expression should parse").to_string()
}

#[test]
fn test_nested_index_accessors() {
    let path = parse_path("d.contacts[:age].localized[d.idx]").unwrap();
    let names: Vec<&str> = path.segments.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["d", "contacts", "localized"]);
    assert_eq!(
        path.segments[1].index,
        Some(IndexAccessor::Value(Expr::param("age")))
    );
    match &path.segments[2].index {
        Some(IndexAccessor::Value(Expr::Path(inner))) => assert_eq!(inner.to_string(), "d.idx"),
        other => panic!("unexpected accessor {other:?}"),
    }
    assert_eq!(path.to_string(), "d.contacts[:age].localized[d.idx]");
}

#[test]
fn test_predicate_accessor_keeps_element_alias() {
    let path = parse_path("d.contacts[KEY(_) = 1 AND _.name = :n]").unwrap();
    match &path.segments[1].index {
        Some(IndexAccessor::Predicate(Expr::Binary { op, .. })) => assert_eq!(*op, BinaryOperator::And),
        other => panic!("unexpected accessor {other:?}"),
    }
    assert_eq!(path.to_string(), "d.contacts[KEY(_) = 1 AND _.name = :n]");
}

#[test]
fn test_treat_in_the_middle_of_a_path() {
    assert_eq!(
        roundtrip("TREAT(d.owner AS Employee).salary"),
        "TREAT(d.owner AS Employee).salary"
    );
    let path = parse_path("TREAT(d.owner AS Employee).friend.name").unwrap();
    assert_eq!(path.segments[1].treat.as_deref(), Some("Employee"));
    assert_eq!(path.segments[3].name, "name");
}

#[test]
fn test_predicate_forms() {
    assert_eq!(roundtrip("d.age between 1 and 10"), "d.age BETWEEN 1 AND 10");
    assert_eq!(roundtrip("d.age NOT IN (1, 2)"), "d.age NOT IN (1, 2)");
    assert_eq!(roundtrip("d.age IN :ages"), "d.age IN (:ages)");
    assert_eq!(roundtrip("d.partners is not empty"), "d.partners IS NOT EMPTY");
    assert_eq!(roundtrip("d.name IS NULL"), "d.name IS NULL");
    assert_eq!(roundtrip("d.name NOT LIKE 'a%'"), "d.name NOT LIKE 'a%'");
}

#[test]
fn test_functions_are_upper_cased() {
    assert_eq!(roundtrip("size(d.partners)"), "SIZE(d.partners)");
    assert_eq!(roundtrip("count(distinct d.id)"), "COUNT(DISTINCT d.id)");
    assert_eq!(roundtrip("FUNCTION('group_concat', d.name)"), "GROUP_CONCAT(d.name)");
}

#[test]
fn test_case_expression() {
    assert_eq!(
        roundtrip("CASE WHEN d.age > 18 THEN 'adult' ELSE 'minor' END"),
        "CASE WHEN d.age > 18 THEN 'adult' ELSE 'minor' END"
    );
}

#[test]
fn test_syntax_errors_carry_spans() {
    match parse("d.name # 1") {
        Err(QueryError::Syntax { span, .. }) => assert_eq!(span.start, 7),
        other => panic!("unexpected result {other:?}"),
    }
    assert!(matches!(parse(""), Err(QueryError::Syntax { .. })));
    assert!(matches!(parse("d.contacts[:age"), Err(QueryError::Syntax { .. })));
    assert!(matches!(parse_path("d.age > 1"), Err(QueryError::Syntax { .. })));
}

#[test]
fn test_element_alias_is_confined_to_predicates() {
    assert!(matches!(parse("_.name"), Err(QueryError::Syntax { .. })));
    assert!(matches!(parse("d.contacts[_]"), Err(QueryError::Syntax { .. })));
    assert!(matches!(parse("d._"), Err(QueryError::Syntax { .. })));
}

#[test]
fn test_window_function() {
    assert_eq!(
        roundtrip("sum(d.age) over (partition by d.owner.name order by d.id desc nulls last)"),
        "SUM(d.age) OVER (PARTITION BY d.owner.name ORDER BY d.id DESC NULLS LAST)"
    );
    assert!(matches!(parse("SUM(d.age) OVER (ORDER BY d.id"), Err(QueryError::Syntax { .. })));
}
