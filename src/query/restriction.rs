//! Restriction and CASE WHEN sub-builders.
//!
//! Both hold a mutable borrow of the builder they report to and a slot on
//! the shared [`BuilderStack`](super::BuilderStack). A restriction is
//! finished by exactly one terminal call (`eq`, `is_null`, `between(..).and(..)`,
//! ...); a CASE WHEN is finished by `otherwise`.

use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::sql::expr::{BinaryOperator, Expr};

use super::{BuilderState, Clause, PredicateSink, Session};

const RESTRICTION: &str = "RestrictionBuilder";
const CASE_WHEN: &str = "CaseWhenBuilder";

// =============================================================================
// RestrictionBuilder
// =============================================================================

/// Builds one predicate whose left operand is fixed at creation.
pub struct RestrictionBuilder<'b, S: PredicateSink> {
    sink: &'b mut S,
    clause: Clause,
    left: Expr,
    depth: usize,
    /// Lower bound and negation of a started BETWEEN.
    between: Option<(Expr, bool)>,
}

impl<'b, S: PredicateSink> RestrictionBuilder<'b, S> {
    pub(crate) fn new(sink: &'b mut S, clause: Clause, left: Expr) -> Self {
        let depth = sink.session().builders.push(RESTRICTION);
        Self {
            sink,
            clause,
            left,
            depth,
            between: None,
        }
    }

    fn session(&mut self) -> &mut Session {
        self.sink.session()
    }

    fn ensure(&mut self, expected: BuilderState, action: &'static str) -> QueryResult<()> {
        let depth = self.depth;
        self.session().builders.ensure(depth, RESTRICTION, expected, action)
    }

    fn finish(&mut self, predicate: Expr) -> QueryResult<&mut S> {
        let depth = self.depth;
        self.session().builders.close(depth);
        self.sink.accept(self.clause, predicate)?;
        Ok(&mut *self.sink)
    }

    fn compare(&mut self, op: BinaryOperator, right: Expr) -> QueryResult<&mut S> {
        let predicate = Expr::binary(self.left.clone(), op, right);
        self.finish(predicate)
    }

    fn compare_value(&mut self, op: BinaryOperator, value: Value, action: &'static str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, action)?;
        let right = self.session().bind(value);
        self.compare(op, right)
    }

    fn compare_expression(&mut self, op: BinaryOperator, text: &str, action: &'static str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, action)?;
        let right = self.session().parse(text)?;
        self.compare(op, right)
    }

    pub fn eq(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Eq, value.into(), "eq")
    }

    pub fn ne(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Ne, value.into(), "ne")
    }

    pub fn lt(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Lt, value.into(), "lt")
    }

    pub fn le(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Lte, value.into(), "le")
    }

    pub fn gt(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Gt, value.into(), "gt")
    }

    pub fn ge(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.compare_value(BinaryOperator::Gte, value.into(), "ge")
    }

    /// Compare against another expression, e.g. `eq_expression("d.owner.name")`
    /// or `eq_expression(":name")`.
    pub fn eq_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Eq, expression, "eq_expression")
    }

    pub fn ne_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Ne, expression, "ne_expression")
    }

    pub fn lt_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Lt, expression, "lt_expression")
    }

    pub fn le_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Lte, expression, "le_expression")
    }

    pub fn gt_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Gt, expression, "gt_expression")
    }

    pub fn ge_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.compare_expression(BinaryOperator::Gte, expression, "ge_expression")
    }

    pub fn is_null(&mut self) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "is_null")?;
        self.finish(Expr::is_null(self.left.clone(), false))
    }

    pub fn is_not_null(&mut self) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "is_not_null")?;
        self.finish(Expr::is_null(self.left.clone(), true))
    }

    pub fn is_empty(&mut self) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "is_empty")?;
        self.finish(Expr::IsEmpty {
            expr: Box::new(self.left.clone()),
            negated: false,
        })
    }

    pub fn is_not_empty(&mut self) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "is_not_empty")?;
        self.finish(Expr::IsEmpty {
            expr: Box::new(self.left.clone()),
            negated: true,
        })
    }

    /// `left IN (:param_0, :param_1, ...)`, one parameter per value.
    pub fn in_values<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "in_values")?;
        self.in_list(values, false)
    }

    pub fn not_in_values<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "not_in_values")?;
        self.in_list(values, true)
    }

    fn in_list<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>, negated: bool) -> QueryResult<&mut S> {
        let values: Vec<Expr> = values
            .into_iter()
            .map(|v| self.session().bind(v.into()))
            .collect();
        let predicate = Expr::In {
            expr: Box::new(self.left.clone()),
            values,
            negated,
        };
        self.finish(predicate)
    }

    /// `left IN (e1, e2, ...)` over expressions, e.g. `in_expressions(&[":ids"])`.
    pub fn in_expressions(&mut self, expressions: &[&str]) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "in_expressions")?;
        let mut values = Vec::with_capacity(expressions.len());
        for text in expressions {
            values.push(self.session().parse(text)?);
        }
        let predicate = Expr::In {
            expr: Box::new(self.left.clone()),
            values,
            negated: false,
        };
        self.finish(predicate)
    }

    pub fn like(&mut self, pattern: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "like")?;
        self.like_with(pattern, None, false)
    }

    pub fn not_like(&mut self, pattern: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "not_like")?;
        self.like_with(pattern, None, true)
    }

    /// LIKE with an escape character for `%` and `_` in the pattern.
    pub fn like_escaped(&mut self, pattern: &str, escape: char) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "like_escaped")?;
        self.like_with(pattern, Some(escape), false)
    }

    fn like_with(&mut self, pattern: &str, escape: Option<char>, negated: bool) -> QueryResult<&mut S> {
        let pattern = self.session().bind(Value::from(pattern));
        let predicate = Expr::Like {
            expr: Box::new(self.left.clone()),
            pattern: Box::new(pattern),
            escape: escape.map(|c| Box::new(Expr::string(c.to_string()))),
            negated,
        };
        self.finish(predicate)
    }

    pub fn like_expression(&mut self, expression: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "like_expression")?;
        let pattern = self.session().parse(expression)?;
        let predicate = Expr::Like {
            expr: Box::new(self.left.clone()),
            pattern: Box::new(pattern),
            escape: None,
            negated: false,
        };
        self.finish(predicate)
    }

    /// `left MEMBER OF collection`
    pub fn member_of(&mut self, collection: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "member_of")?;
        self.member(collection, false)
    }

    pub fn not_member_of(&mut self, collection: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "not_member_of")?;
        self.member(collection, true)
    }

    fn member(&mut self, collection: &str, negated: bool) -> QueryResult<&mut S> {
        let collection = self.session().parse(collection)?;
        let predicate = Expr::MemberOf {
            element: Box::new(self.left.clone()),
            collection: Box::new(collection),
            negated,
        };
        self.finish(predicate)
    }

    // =========================================================================
    // BETWEEN
    // =========================================================================

    /// Start `left BETWEEN low AND ...`; finish with [`and`](Self::and).
    pub fn between(&mut self, low: impl Into<Value>) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "between")?;
        let low = self.session().bind(low.into());
        self.start_between(low, false)
    }

    pub fn not_between(&mut self, low: impl Into<Value>) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "not_between")?;
        let low = self.session().bind(low.into());
        self.start_between(low, true)
    }

    pub fn between_expression(&mut self, low: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "between_expression")?;
        let low = self.session().parse(low)?;
        self.start_between(low, false)
    }

    fn start_between(&mut self, low: Expr, negated: bool) -> QueryResult<&mut Self> {
        self.between = Some((low, negated));
        let depth = self.depth;
        self.session()
            .builders
            .set_state(depth, BuilderState::AwaitingTerminal);
        Ok(self)
    }

    pub fn and(&mut self, high: impl Into<Value>) -> QueryResult<&mut S> {
        self.ensure(BuilderState::AwaitingTerminal, "and")?;
        let high = self.session().bind(high.into());
        self.finish_between(high)
    }

    pub fn and_expression(&mut self, high: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::AwaitingTerminal, "and_expression")?;
        let high = self.session().parse(high)?;
        self.finish_between(high)
    }

    fn finish_between(&mut self, high: Expr) -> QueryResult<&mut S> {
        let Some((low, negated)) = self.between.take() else {
            return Err(QueryError::InvalidArgument("BETWEEN without a lower bound".into()));
        };
        let predicate = Expr::Between {
            expr: Box::new(self.left.clone()),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        };
        self.finish(predicate)
    }
}

// =============================================================================
// CaseWhenBuilder
// =============================================================================

/// A builder that takes a finished CASE expression.
pub trait CaseSink: PredicateSink {
    fn accept_case(&mut self, case: Expr, alias: Option<String>) -> QueryResult<()>;
}

/// `CASE WHEN ... THEN ... [WHEN ...] ELSE ... END`.
///
/// Every `when` must be followed by `then`; `otherwise` closes the
/// expression and hands it to the parent.
pub struct CaseWhenBuilder<'b, S: CaseSink> {
    sink: &'b mut S,
    alias: Option<String>,
    whens: Vec<(Expr, Expr)>,
    condition: Option<Expr>,
    depth: usize,
}

impl<'b, S: CaseSink> CaseWhenBuilder<'b, S> {
    pub(crate) fn new(sink: &'b mut S, alias: Option<String>) -> Self {
        let depth = sink.session().builders.push(CASE_WHEN);
        Self {
            sink,
            alias,
            whens: Vec::new(),
            condition: None,
            depth,
        }
    }

    fn ensure(&mut self, expected: BuilderState, action: &'static str) -> QueryResult<()> {
        let depth = self.depth;
        self.sink
            .session()
            .builders
            .ensure(depth, CASE_WHEN, expected, action)
    }

    /// Start a condition on `expression`, finished by a restriction terminal.
    pub fn when(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.ensure(BuilderState::Open, "when")?;
        let left = self.sink.session().parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::Select, left))
    }

    /// Use a complete predicate as the condition.
    pub fn when_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "when_expression")?;
        let predicate = self.sink.session().parse(predicate)?;
        self.accept(Clause::Select, predicate)?;
        Ok(self)
    }

    pub fn then(&mut self, result: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::AwaitingTerminal, "then")?;
        let result = self.sink.session().parse(result)?;
        self.push_then(result)
    }

    /// `THEN :param_n` with a bound value.
    pub fn then_value(&mut self, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::AwaitingTerminal, "then_value")?;
        let result = self.sink.session().bind(value.into());
        self.push_then(result)
    }

    fn push_then(&mut self, result: Expr) -> QueryResult<&mut Self> {
        let Some(condition) = self.condition.take() else {
            return Err(QueryError::InvalidArgument("THEN without a WHEN condition".into()));
        };
        self.whens.push((condition, result));
        let depth = self.depth;
        self.sink
            .session()
            .builders
            .set_state(depth, BuilderState::Open);
        Ok(self)
    }

    /// Close with `ELSE result END`.
    pub fn otherwise(&mut self, result: &str) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "otherwise")?;
        let result = self.sink.session().parse(result)?;
        self.close(result)
    }

    pub fn otherwise_value(&mut self, value: impl Into<Value>) -> QueryResult<&mut S> {
        self.ensure(BuilderState::Open, "otherwise_value")?;
        let result = self.sink.session().bind(value.into());
        self.close(result)
    }

    fn close(&mut self, otherwise: Expr) -> QueryResult<&mut S> {
        if self.whens.is_empty() {
            return Err(QueryError::InvalidArgument("CASE needs at least one WHEN".into()));
        }
        let case = Expr::Case {
            operand: None,
            when_clauses: std::mem::take(&mut self.whens),
            else_clause: Some(Box::new(otherwise)),
        };
        let depth = self.depth;
        self.sink.session().builders.close(depth);
        self.sink.accept_case(case, self.alias.take())?;
        Ok(&mut *self.sink)
    }
}

impl<S: CaseSink> PredicateSink for CaseWhenBuilder<'_, S> {
    fn session(&mut self) -> &mut Session {
        self.sink.session()
    }

    fn accept(&mut self, _clause: Clause, predicate: Expr) -> QueryResult<()> {
        self.condition = Some(predicate);
        let depth = self.depth;
        self.sink
            .session()
            .builders
            .set_state(depth, BuilderState::AwaitingTerminal);
        Ok(())
    }
}
