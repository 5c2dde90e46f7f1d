//! Tests for sub-builder lifecycles and the chaining rules between them.

#[path = "../common/mod.rs"]
mod common;

use criteria::query::BuilderState;
use criteria::{CriteriaBuilder, QueryError};
use serde_json::Value;

fn chaining(builder: &'static str, state: BuilderState, action: &'static str) -> QueryError {
    QueryError::BuilderChaining {
        builder,
        state,
        action,
    }
}

#[test]
fn test_dropped_restriction_blocks_parent() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    drop(cb.where_("d.name").unwrap());
    assert_eq!(
        cb.select("d.name").err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "select"))
    );
    assert_eq!(
        cb.from("Person", "p").err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "from"))
    );
}

#[test]
fn test_dropped_restriction_blocks_parameters_and_pagination() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_expression("d.age > :minAge")
        .unwrap();
    drop(cb.where_("d.name").unwrap());
    assert_eq!(
        cb.set_parameter("minAge", 18).err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "set_parameter"))
    );
    assert_eq!(
        cb.set_first_result(20).err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "set_first_result"))
    );
    assert_eq!(
        cb.set_max_results(10).err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "set_max_results"))
    );
    assert_eq!(cb.model().first_result, 0);
    assert_eq!(cb.model().max_results, None);
}

#[test]
fn test_between_needs_and() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    {
        let mut restriction = cb.where_("d.age").unwrap();
        restriction.between(18).unwrap();
        assert_eq!(
            restriction.gt(1).err(),
            Some(chaining("RestrictionBuilder", BuilderState::AwaitingTerminal, "gt"))
        );
    }
    assert_eq!(
        cb.query_string().err(),
        Some(chaining("RestrictionBuilder", BuilderState::AwaitingTerminal, "statement"))
    );
}

#[test]
fn test_between_and() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_("d.age")
        .unwrap()
        .not_between(18)
        .unwrap()
        .and(65)
        .unwrap();
    let statement = cb.statement().unwrap();
    assert_eq!(
        statement.text,
        "SELECT d FROM Document d WHERE d.age NOT BETWEEN :param_0 AND :param_1"
    );
    let values: Vec<Option<Value>> = statement.parameters.into_iter().map(|p| p.value).collect();
    assert_eq!(values, vec![Some(Value::from(18)), Some(Value::from(65))]);
}

#[test]
fn test_select_case() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    cb.select_case(Some("category"))
        .unwrap()
        .when("d.age")
        .unwrap()
        .gt(18)
        .unwrap()
        .then("'adult'")
        .unwrap()
        .otherwise("'minor'")
        .unwrap()
        .order_by_asc("category")
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT CASE WHEN d.age > :param_0 THEN 'adult' ELSE 'minor' END AS category \
         FROM Document d ORDER BY category ASC NULLS LAST"
    );
}

#[test]
fn test_case_when_needs_then() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    {
        let mut case = cb.select_case(None).unwrap();
        assert!(matches!(case.otherwise("0"), Err(QueryError::InvalidArgument(_))));
        case.when_expression("d.age > 18").unwrap();
        assert_eq!(
            case.otherwise("0").err(),
            Some(chaining("CaseWhenBuilder", BuilderState::AwaitingTerminal, "otherwise"))
        );
    }
    assert_eq!(
        cb.select("d.name").err(),
        Some(chaining("CaseWhenBuilder", BuilderState::AwaitingTerminal, "select"))
    );
}

#[test]
fn test_where_not_exists() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    cb.where_not_exists()
        .unwrap()
        .from("Person", "p")
        .unwrap()
        .where_expression("p.name = d.name")
        .unwrap()
        .end()
        .unwrap();
    assert_eq!(
        cb.query_string().unwrap(),
        "SELECT d FROM Document d WHERE NOT EXISTS (SELECT 1 FROM Person p WHERE p.name = d.name)"
    );
}

#[test]
fn test_subquery_rejects_end_while_restriction_open() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap();
    let mut subquery = cb.where_exists().unwrap();
    assert!(matches!(subquery.end(), Err(QueryError::InvalidArgument(_))));
    subquery.from_path("d.partners", "p").unwrap();
    drop(subquery.where_("p.name").unwrap());
    assert_eq!(
        subquery.end().err(),
        Some(chaining("RestrictionBuilder", BuilderState::Open, "end"))
    );
}

#[test]
fn test_unterminated_cte_blocks_parent() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    drop(cb.with_cte("DocumentCte").unwrap());
    assert_eq!(
        cb.from("DocumentCte", "c").err(),
        Some(chaining("CteBuilder", BuilderState::Open, "from"))
    );
}

#[test]
fn test_select_alias_must_be_unique() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d").unwrap().select_as("d.name", "n").unwrap();
    assert!(matches!(
        cb.select_as("d.owner.name", "n"),
        Err(QueryError::InvalidArgument(_))
    ));
    assert_eq!(cb.model().graph.len(), 1);
}

#[test]
fn test_named_parameters() {
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, common::h2());
    cb.from("Document", "d")
        .unwrap()
        .where_expression("d.age > :minAge AND d.name = :name")
        .unwrap()
        .set_parameter("minAge", 18)
        .unwrap();
    let statement = cb.statement().unwrap();
    assert_eq!(
        statement.text,
        "SELECT d FROM Document d WHERE d.age > :minAge AND d.name = :name"
    );
    assert_eq!(statement.parameter("minAge").unwrap().value, Some(Value::from(18)));
    assert_eq!(statement.parameter("name").unwrap().value, None);
}
