//! The query model every builder call mutates.
//!
//! Holds resolved expression trees only; the text each clause renders to is
//! produced by [`crate::render`] on demand.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::join::{JoinGraph, JoinId};
use crate::sql::expr::Expr;

/// Statement form of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatementKind {
    #[default]
    Select,
    Update,
    Delete,
    Insert,
}

impl StatementKind {
    pub fn is_dml(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

/// A resolved expression with the facts later stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpression {
    pub expr: Expr,
    /// Join nodes the expression reads.
    pub joins: BTreeSet<JoinId>,
    /// Attribute type when the expression is a plain path.
    pub result_type: Option<String>,
    pub nullable: bool,
}

impl ResolvedExpression {
    pub fn new(expr: Expr, graph: &JoinGraph, result_type: Option<String>, nullable: bool) -> Self {
        let joins = expr.referenced_joins(graph);
        Self {
            expr,
            joins,
            result_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: ResolvedExpression,
    pub alias: Option<String>,
    /// Singular basic attributes of a selected entity, used for grouping.
    pub expansion: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: ResolvedExpression,
    pub ascending: bool,
    pub nulls_first: bool,
    /// Set when the item orders by a select alias.
    pub select_alias: Option<String>,
}

/// `SET target = value` of an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub target: Expr,
    pub value: Expr,
}

/// Target of an `INSERT INTO ... SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertTarget {
    pub entity: String,
    /// Bound attribute names, in bind order.
    pub columns: Vec<String>,
}

/// A `WITH` clause entry.
#[derive(Debug, Clone)]
pub struct CteDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub recursive: bool,
    pub base: QueryModel,
    /// Part after `UNION ALL` of a recursive CTE.
    pub recursive_part: Option<QueryModel>,
}

/// Everything a statement consists of.
#[derive(Debug, Clone, Default)]
pub struct QueryModel {
    pub kind: StatementKind,
    pub graph: JoinGraph,
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    /// Conjuncts of the WHERE clause.
    pub where_clause: Vec<Expr>,
    pub group_by: Vec<ResolvedExpression>,
    pub having: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub set_clauses: Vec<SetClause>,
    pub insert: Option<InsertTarget>,
    pub returning: Vec<Expr>,
    pub ctes: Vec<CteDefinition>,
    pub first_result: u64,
    pub max_results: Option<u64>,
}

impl QueryModel {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn has_aggregate_clauses(&self) -> bool {
        !self.group_by.is_empty() || !self.having.is_empty()
    }

    pub fn find_select_alias(&self, alias: &str) -> Option<&SelectItem> {
        self.select.iter().find(|s| s.alias.as_deref() == Some(alias))
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Named parameters of a statement, bound or declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
    next_auto: usize,
}

impl Parameters {
    /// Bind a value under the next `param_<n>` name.
    pub fn bind(&mut self, value: Value) -> String {
        let name = format!("param_{}", self.next_auto);
        self.next_auto += 1;
        self.values.insert(name.clone(), value);
        name
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
