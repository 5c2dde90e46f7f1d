//! Common table expressions.
//!
//! A [`CteBuilder`] fills a [`CteDefinition`] whose parts are independent
//! [`QueryModel`]s with their own join graphs. Parameters are shared with
//! the enclosing statement. A recursive CTE requires `union_all` before
//! `end`; the recursive part must bind the columns of the base part in the
//! same order.

use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::join::ScopeId;
use crate::sql::expr::Expr;

use super::builder::{add_root, entity_expansion, mode_for, speculate, CriteriaBuilder};
use super::model::{CteDefinition, QueryModel, ResolvedExpression, SelectItem, SetClause, StatementKind};
use super::resolve::Clause;
use super::restriction::RestrictionBuilder;
use super::{BuilderState, PredicateSink, Session};

const CTE: &str = "CteBuilder";

pub struct CteBuilder<'b, 'm> {
    parent: &'b mut CriteriaBuilder<'m>,
    cte_type: String,
    columns: Vec<String>,
    recursive: bool,
    base: QueryModel,
    recursive_part: Option<QueryModel>,
    depth: usize,
}

impl<'b, 'm> CteBuilder<'b, 'm> {
    pub(crate) fn new(parent: &'b mut CriteriaBuilder<'m>, cte_type: &str, recursive: bool) -> QueryResult<Self> {
        if !parent.metamodel().is_cte_type(cte_type) {
            return Err(QueryError::InvalidArgument(format!(
                "'{}' is not a CTE type",
                cte_type
            )));
        }
        let name = parent.metamodel().entity_name(cte_type);
        if parent.model().ctes.iter().any(|cte| cte.name == name) {
            return Err(QueryError::InvalidArgument(format!(
                "CTE '{}' is already defined",
                name
            )));
        }
        let depth = parent.session_mut().builders.push(CTE);
        if recursive {
            parent
                .session_mut()
                .builders
                .set_state(depth, BuilderState::AwaitingTerminal);
        }
        Ok(Self {
            parent,
            cte_type: cte_type.to_string(),
            columns: Vec::new(),
            recursive,
            base: QueryModel::new(StatementKind::Select),
            recursive_part: None,
            depth,
        })
    }

    fn ensure_active(&mut self, action: &'static str) -> QueryResult<()> {
        let depth = self.depth;
        self.parent
            .session_mut()
            .builders
            .ensure_active(depth, CTE, action)
    }

    fn ensure(&mut self, expected: BuilderState, action: &'static str) -> QueryResult<()> {
        let depth = self.depth;
        self.parent
            .session_mut()
            .builders
            .ensure(depth, CTE, expected, action)
    }

    fn current(&mut self) -> &mut QueryModel {
        match self.recursive_part.as_mut() {
            Some(part) => part,
            None => &mut self.base,
        }
    }

    fn resolve(&mut self, clause: Clause, expr: &Expr) -> QueryResult<ResolvedExpression> {
        let model = match self.recursive_part.as_mut() {
            Some(part) => part,
            None => &mut self.base,
        };
        let mode = mode_for(model.kind);
        speculate(
            self.parent.metamodel(),
            self.parent.config(),
            &mut model.graph,
            ScopeId::MAIN,
            clause,
            mode,
            |r| r.resolve(expr),
        )
    }

    fn parse(&mut self, text: &str) -> QueryResult<Expr> {
        self.parent.session_mut().parse(text)
    }

    fn check_column(&self, column: &str) -> QueryResult<()> {
        if self
            .parent
            .metamodel()
            .resolve_attribute(&self.cte_type, column)
            .is_none()
        {
            return Err(QueryError::unknown_attribute(&self.cte_type, column));
        }
        Ok(())
    }

    /// Check `column` may be bound next: base columns are unique, the
    /// recursive part follows the base order.
    fn check_next_column(&self, column: &str) -> QueryResult<()> {
        self.check_column(column)?;
        match &self.recursive_part {
            Some(part) => match self.columns.get(part.select.len()) {
                Some(expected) if expected == column => Ok(()),
                Some(expected) => Err(QueryError::InvalidArgument(format!(
                    "recursive part of '{}' must bind '{}' next, not '{}'",
                    self.cte_type, expected, column
                ))),
                None => Err(QueryError::InvalidArgument(format!(
                    "recursive part of '{}' binds more columns than its base",
                    self.cte_type
                ))),
            },
            None if self.columns.iter().any(|c| c == column) => Err(QueryError::InvalidArgument(format!(
                "column '{}' of '{}' is already bound",
                column, self.cte_type
            ))),
            None => Ok(()),
        }
    }

    fn record_column(&mut self, column: &str) {
        if self.recursive_part.is_none() {
            self.columns.push(column.to_string());
        }
    }

    // =========================================================================
    // SELECT parts
    // =========================================================================

    pub fn from(&mut self, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        self.ensure_active("from")?;
        let metamodel = self.parent.metamodel();
        let model = self.current();
        if model.kind != StatementKind::Select {
            return Err(QueryError::InvalidArgument(format!(
                "{:?} CTE parts take their root from the DML call",
                model.kind
            )));
        }
        add_root(metamodel, &mut model.graph, entity, alias, ScopeId::MAIN)?;
        Ok(self)
    }

    /// Bind a CTE column to a select expression.
    pub fn bind(&mut self, column: &str, expression: &str) -> QueryResult<&mut Self> {
        self.ensure_active("bind")?;
        if self.current().kind != StatementKind::Select {
            return Err(QueryError::InvalidArgument(
                "DML CTE parts bind columns with returning".into(),
            ));
        }
        self.check_next_column(column)?;
        let expr = self.parse(expression)?;
        let resolved = self.resolve(Clause::Select, &expr)?;
        self.record_column(column);
        let metamodel = self.parent.metamodel();
        let model = self.current();
        let expansion = entity_expansion(metamodel, &model.graph, &resolved.expr);
        model.select.push(SelectItem {
            expr: resolved,
            alias: None,
            expansion,
        });
        Ok(self)
    }

    pub fn where_(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.ensure_active("where")?;
        let left = self.parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::Where, left))
    }

    pub fn where_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.ensure_active("where_expression")?;
        let predicate = self.parse(predicate)?;
        self.accept(Clause::Where, predicate)?;
        Ok(self)
    }

    /// Finish the base part of a recursive CTE and start the recursive one.
    pub fn union_all(&mut self) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::AwaitingTerminal, "union_all")?;
        if self.columns.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "base part of '{}' binds no columns",
                self.cte_type
            )));
        }
        self.recursive_part = Some(QueryModel::new(StatementKind::Select));
        let depth = self.depth;
        self.parent
            .session_mut()
            .builders
            .set_state(depth, BuilderState::Open);
        Ok(self)
    }

    // =========================================================================
    // DML parts
    // =========================================================================

    /// Make the CTE a `DELETE ... RETURNING`.
    pub fn delete_from(&mut self, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "delete_from")?;
        self.start_dml(StatementKind::Delete, entity, alias)
    }

    /// Make the CTE an `UPDATE ... RETURNING`.
    pub fn update(&mut self, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "update")?;
        self.start_dml(StatementKind::Update, entity, alias)
    }

    fn start_dml(&mut self, kind: StatementKind, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        if self.recursive || !self.base.graph.is_empty() || !self.columns.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "{:?} must be the only part of CTE '{}'",
                kind, self.cte_type
            )));
        }
        self.base.kind = kind;
        add_root(self.parent.metamodel(), &mut self.base.graph, entity, alias, ScopeId::MAIN)?;
        Ok(self)
    }

    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "set")?;
        let value = self.parent.session_mut().bind(value.into());
        self.push_set(attribute, value)
    }

    pub fn set_expression(&mut self, attribute: &str, expression: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "set_expression")?;
        let value = self.parse(expression)?;
        let value = self.resolve(Clause::Set, &value)?.expr;
        self.push_set(attribute, value)
    }

    fn push_set(&mut self, attribute: &str, value: Expr) -> QueryResult<&mut Self> {
        if self.base.kind != StatementKind::Update {
            return Err(QueryError::InvalidArgument(
                "set is only available on UPDATE CTE parts".into(),
            ));
        }
        let target = self.parse(attribute)?;
        let target = self.resolve(Clause::Set, &target)?.expr;
        self.base.set_clauses.push(SetClause { target, value });
        Ok(self)
    }

    /// Bind a CTE column to a `RETURNING` expression of the DML part.
    pub fn returning(&mut self, column: &str, expression: &str) -> QueryResult<&mut Self> {
        self.ensure(BuilderState::Open, "returning")?;
        if !self.base.kind.is_dml() {
            return Err(QueryError::InvalidArgument(
                "returning needs a DELETE or UPDATE CTE part".into(),
            ));
        }
        let config = self.parent.config();
        if !config.capabilities.supports_cte_returning {
            return Err(QueryError::unsupported("RETURNING in a CTE", config.dialect));
        }
        self.check_next_column(column)?;
        let expr = self.parse(expression)?;
        let resolved = self.resolve(Clause::Returning, &expr)?;
        self.record_column(column);
        self.base.returning.push(resolved.expr);
        Ok(self)
    }

    // =========================================================================
    // Terminal
    // =========================================================================

    /// Validate the parts and register the CTE on the statement.
    pub fn end(&mut self) -> QueryResult<&mut CriteriaBuilder<'m>> {
        self.ensure(BuilderState::Open, "end")?;
        if self.columns.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "CTE '{}' binds no columns",
                self.cte_type
            )));
        }
        if self.base.graph.roots(ScopeId::MAIN).is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "CTE '{}' has no FROM item",
                self.cte_type
            )));
        }
        if let Some(part) = &self.recursive_part {
            if part.select.len() != self.columns.len() {
                return Err(QueryError::InvalidArgument(format!(
                    "recursive part of '{}' binds {} of {} columns",
                    self.cte_type,
                    part.select.len(),
                    self.columns.len()
                )));
            }
            if part.graph.roots(ScopeId::MAIN).is_empty() {
                return Err(QueryError::InvalidArgument(format!(
                    "recursive part of '{}' has no FROM item",
                    self.cte_type
                )));
            }
        }

        let definition = CteDefinition {
            name: self.parent.metamodel().entity_name(&self.cte_type),
            columns: std::mem::take(&mut self.columns),
            recursive: self.recursive,
            base: std::mem::take(&mut self.base),
            recursive_part: self.recursive_part.take(),
        };
        log::debug!(
            "defined CTE {}({})",
            definition.name,
            definition.columns.join(", ")
        );
        let depth = self.depth;
        self.parent.session_mut().builders.close(depth);
        self.parent.model_mut().ctes.push(definition);
        Ok(&mut *self.parent)
    }
}

impl PredicateSink for CteBuilder<'_, '_> {
    fn session(&mut self) -> &mut Session {
        self.parent.session_mut()
    }

    fn accept(&mut self, clause: Clause, predicate: Expr) -> QueryResult<()> {
        let resolved = self.resolve(clause, &predicate)?.expr;
        self.current().where_clause.push(resolved);
        Ok(())
    }
}
