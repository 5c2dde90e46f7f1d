//! The top-level fluent builder and its ON and subquery sub-builders.
//!
//! # Example
//!
//! ```ignore
//! let mut cb = CriteriaBuilder::new(&metamodel, QueryConfig::default());
//! cb.from("Document", "d")?
//!     .select("d.name")?
//!     .where_("d.owner.age")?
//!     .gt(18)?
//!     .order_by_asc("d.id")?;
//! let statement = cb.statement()?;
//! ```

use serde_json::Value;

use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::join::{JoinGraph, JoinId, JoinType, ScopeId};
use crate::keyset::KeysetPage;
use crate::metadata::{AttributeKind, Cardinality, Metamodel};
use crate::path::PathExpr;
use crate::render::{PaginatedStatements, QueryRenderer, Statement};
use crate::sql::expr::{AttrRef, Expr, Subquery};

use super::cte::CteBuilder;
use super::model::{
    InsertTarget, OrderItem, Parameters, QueryModel, ResolvedExpression, SelectItem, SetClause,
    StatementKind,
};
use super::resolve::{Clause, ResolveMode, Resolver};
use super::restriction::{CaseSink, CaseWhenBuilder, RestrictionBuilder};
use super::{BuilderState, PredicateSink, Session};

const SUBQUERY: &str = "SubqueryBuilder";
const ON: &str = "OnBuilder";

// =============================================================================
// Shared helpers
// =============================================================================

/// Run `f` against a resolver over `graph`, rolling back every join a
/// failed attempt created.
pub(crate) fn speculate<T>(
    metamodel: &dyn Metamodel,
    config: &QueryConfig,
    graph: &mut JoinGraph,
    scope: ScopeId,
    clause: Clause,
    mode: ResolveMode,
    f: impl FnOnce(&mut Resolver<'_>) -> QueryResult<T>,
) -> QueryResult<T> {
    let checkpoint = graph.checkpoint();
    let result = {
        let mut resolver = Resolver::new(metamodel, config, graph, scope, clause).with_mode(mode);
        f(&mut resolver)
    };
    if result.is_err() {
        graph.rollback(checkpoint);
    }
    result
}

pub(crate) fn mode_for(kind: StatementKind) -> ResolveMode {
    match kind {
        StatementKind::Update | StatementKind::Delete => ResolveMode::PathOnly,
        StatementKind::Select | StatementKind::Insert => ResolveMode::Join,
    }
}

/// Add a FROM item for an entity name.
pub(crate) fn add_root(
    metamodel: &dyn Metamodel,
    graph: &mut JoinGraph,
    entity: &str,
    alias: &str,
    scope: ScopeId,
) -> QueryResult<JoinId> {
    let entity_type = metamodel
        .entity_type(entity)
        .ok_or_else(|| QueryError::UnknownType(entity.to_string()))?;
    let id = graph.add_root(&entity_type, alias, scope)?;
    graph.node_mut(id).entity_name = metamodel.entity_name(&entity_type);
    Ok(id)
}

/// Singular basic attributes of a selected entity alias, in name order.
pub(crate) fn entity_expansion(metamodel: &dyn Metamodel, graph: &JoinGraph, expr: &Expr) -> Vec<Expr> {
    let Expr::Attribute(attr) = expr else {
        return Vec::new();
    };
    let node = graph.node(attr.join);
    if !attr.path.is_empty() || node.element_kind != AttributeKind::Entity {
        return Vec::new();
    }
    let entity_type = attr.treat.as_deref().unwrap_or(&node.entity_type);
    metamodel
        .attribute_names(entity_type)
        .into_iter()
        .filter(|name| {
            metamodel
                .resolve_attribute(entity_type, name)
                .is_some_and(|a| a.kind == AttributeKind::Basic && a.cardinality == Cardinality::Singular)
        })
        .map(|name| {
            Expr::Attribute(AttrRef {
                path: vec![name],
                ..attr.clone()
            })
        })
        .collect()
}

fn select_item(
    metamodel: &dyn Metamodel,
    graph: &JoinGraph,
    expr: ResolvedExpression,
    alias: Option<String>,
) -> SelectItem {
    let expansion = entity_expansion(metamodel, graph, &expr.expr);
    SelectItem {
        expr,
        alias,
        expansion,
    }
}

// =============================================================================
// CriteriaBuilder
// =============================================================================

/// Builds one SELECT, UPDATE, DELETE or INSERT statement.
pub struct CriteriaBuilder<'m> {
    metamodel: &'m dyn Metamodel,
    config: QueryConfig,
    model: QueryModel,
    session: Session,
}

impl<'m> CriteriaBuilder<'m> {
    /// Start a SELECT statement.
    pub fn new(metamodel: &'m dyn Metamodel, config: QueryConfig) -> Self {
        Self::with_kind(metamodel, config, StatementKind::Select)
    }

    fn with_kind(metamodel: &'m dyn Metamodel, config: QueryConfig, kind: StatementKind) -> Self {
        Self {
            metamodel,
            config,
            model: QueryModel::new(kind),
            session: Session::default(),
        }
    }

    /// `UPDATE Entity alias SET ...`
    pub fn update(
        metamodel: &'m dyn Metamodel,
        config: QueryConfig,
        entity: &str,
        alias: &str,
    ) -> QueryResult<Self> {
        let mut builder = Self::with_kind(metamodel, config, StatementKind::Update);
        add_root(metamodel, &mut builder.model.graph, entity, alias, ScopeId::MAIN)?;
        Ok(builder)
    }

    /// `DELETE FROM Entity alias ...`
    pub fn delete(
        metamodel: &'m dyn Metamodel,
        config: QueryConfig,
        entity: &str,
        alias: &str,
    ) -> QueryResult<Self> {
        let mut builder = Self::with_kind(metamodel, config, StatementKind::Delete);
        add_root(metamodel, &mut builder.model.graph, entity, alias, ScopeId::MAIN)?;
        Ok(builder)
    }

    /// `INSERT INTO Entity(...) SELECT ...`; bind columns with [`bind`](Self::bind).
    pub fn insert(metamodel: &'m dyn Metamodel, config: QueryConfig, entity: &str) -> QueryResult<Self> {
        let entity_type = metamodel
            .entity_type(entity)
            .ok_or_else(|| QueryError::UnknownType(entity.to_string()))?;
        let mut builder = Self::with_kind(metamodel, config, StatementKind::Insert);
        builder.model.insert = Some(InsertTarget {
            entity: metamodel.entity_name(&entity_type),
            columns: Vec::new(),
        });
        Ok(builder)
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn parameters(&self) -> &Parameters {
        &self.session.params
    }

    pub(crate) fn metamodel(&self) -> &'m dyn Metamodel {
        self.metamodel
    }

    pub(crate) fn model_mut(&mut self) -> &mut QueryModel {
        &mut self.model
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn resolve(&mut self, scope: ScopeId, clause: Clause, expr: &Expr) -> QueryResult<ResolvedExpression> {
        let mode = mode_for(self.model.kind);
        speculate(
            self.metamodel,
            &self.config,
            &mut self.model.graph,
            scope,
            clause,
            mode,
            |r| r.resolve(expr),
        )
    }

    fn parse_and_resolve(&mut self, clause: Clause, text: &str) -> QueryResult<ResolvedExpression> {
        let expr = self.session.parse(text)?;
        self.resolve(ScopeId::MAIN, clause, &expr)
    }

    // =========================================================================
    // FROM and SELECT
    // =========================================================================

    /// Add a query root.
    pub fn from(&mut self, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("from")?;
        if matches!(self.model.kind, StatementKind::Update | StatementKind::Delete) {
            return Err(QueryError::InvalidArgument(format!(
                "{:?} statements take their root at construction",
                self.model.kind
            )));
        }
        add_root(self.metamodel, &mut self.model.graph, entity, alias, ScopeId::MAIN)?;
        Ok(self)
    }

    pub fn select(&mut self, expression: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("select")?;
        self.push_select(expression, None)
    }

    pub fn select_as(&mut self, expression: &str, alias: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("select_as")?;
        if self.model.find_select_alias(alias).is_some() {
            return Err(QueryError::InvalidArgument(format!(
                "select alias '{}' is already in use",
                alias
            )));
        }
        self.push_select(expression, Some(alias.to_string()))
    }

    fn push_select(&mut self, expression: &str, alias: Option<String>) -> QueryResult<&mut Self> {
        self.ensure_kind(&[StatementKind::Select], "select")?;
        let resolved = self.parse_and_resolve(Clause::Select, expression)?;
        let item = select_item(self.metamodel, &self.model.graph, resolved, alias);
        self.model.select.push(item);
        Ok(self)
    }

    pub fn distinct(&mut self) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("distinct")?;
        self.model.distinct = true;
        Ok(self)
    }

    /// Select a `CASE WHEN ... END` expression.
    pub fn select_case(&mut self, alias: Option<&str>) -> QueryResult<CaseWhenBuilder<'_, Self>> {
        self.session.builders.ensure_idle("select_case")?;
        self.ensure_kind(&[StatementKind::Select], "select_case")?;
        Ok(CaseWhenBuilder::new(self, alias.map(str::to_string)))
    }

    fn ensure_kind(&self, allowed: &[StatementKind], action: &str) -> QueryResult<()> {
        if allowed.contains(&self.model.kind) {
            Ok(())
        } else {
            Err(QueryError::InvalidArgument(format!(
                "{} is not available on {:?} statements",
                action, self.model.kind
            )))
        }
    }

    // =========================================================================
    // WHERE, GROUP BY, HAVING
    // =========================================================================

    /// Start a restriction on `expression`.
    pub fn where_(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.session.builders.ensure_idle("where")?;
        let left = self.session.parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::Where, left))
    }

    /// Add a complete predicate, e.g. `where_expression("d.age > :minAge")`.
    pub fn where_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("where_expression")?;
        let predicate = self.session.parse(predicate)?;
        self.accept(Clause::Where, predicate)?;
        Ok(self)
    }

    /// `WHERE EXISTS (SELECT ...)`
    pub fn where_exists(&mut self) -> QueryResult<SubqueryBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("where_exists")?;
        Ok(SubqueryBuilder::new(self, false))
    }

    pub fn where_not_exists(&mut self) -> QueryResult<SubqueryBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("where_not_exists")?;
        Ok(SubqueryBuilder::new(self, true))
    }

    pub fn group_by(&mut self, expression: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("group_by")?;
        self.ensure_kind(&[StatementKind::Select, StatementKind::Insert], "group_by")?;
        let resolved = self.parse_and_resolve(Clause::GroupBy, expression)?;
        self.model.group_by.push(resolved);
        Ok(self)
    }

    pub fn having(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.session.builders.ensure_idle("having")?;
        let left = self.session.parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::Having, left))
    }

    pub fn having_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("having_expression")?;
        let predicate = self.session.parse(predicate)?;
        self.accept(Clause::Having, predicate)?;
        Ok(self)
    }

    // =========================================================================
    // ORDER BY
    // =========================================================================

    /// Order by an expression or a select alias.
    pub fn order_by(&mut self, expression: &str, ascending: bool, nulls_first: bool) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("order_by")?;
        self.ensure_kind(&[StatementKind::Select, StatementKind::Insert], "order_by")?;
        let item = match self.model.find_select_alias(expression) {
            Some(selected) => OrderItem {
                expr: selected.expr.clone(),
                ascending,
                nulls_first,
                select_alias: Some(expression.to_string()),
            },
            None => OrderItem {
                expr: self.parse_and_resolve(Clause::OrderBy, expression)?,
                ascending,
                nulls_first,
                select_alias: None,
            },
        };
        self.model.order_by.push(item);
        Ok(self)
    }

    /// Ascending, nulls last.
    pub fn order_by_asc(&mut self, expression: &str) -> QueryResult<&mut Self> {
        self.order_by(expression, true, false)
    }

    /// Descending, nulls last.
    pub fn order_by_desc(&mut self, expression: &str) -> QueryResult<&mut Self> {
        self.order_by(expression, false, false)
    }

    // =========================================================================
    // Joins
    // =========================================================================

    pub fn inner_join(&mut self, path: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join(path, alias, JoinType::Inner)
    }

    pub fn left_join(&mut self, path: &str, alias: &str) -> QueryResult<&mut Self> {
        self.join(path, alias, JoinType::Left)
    }

    /// Join an association path under a caller-chosen alias.
    pub fn join(&mut self, path: &str, alias: &str, join_type: JoinType) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("join")?;
        self.explicit_join(path, alias, join_type, false)?;
        Ok(self)
    }

    fn explicit_join(&mut self, path: &str, alias: &str, join_type: JoinType, with_on: bool) -> QueryResult<JoinId> {
        let path = self.path(path)?;
        let mode = mode_for(self.model.kind);
        let scope = self.join_scope(&path);
        speculate(
            self.metamodel,
            &self.config,
            &mut self.model.graph,
            scope,
            Clause::On,
            mode,
            |r| r.join_explicit(&path, alias, join_type, with_on),
        )
    }

    /// Joins hang off the scope of the alias their path starts from.
    fn join_scope(&self, path: &PathExpr) -> ScopeId {
        path.first()
            .and_then(|first| self.model.graph.find_alias(&first.name, ScopeId::MAIN))
            .map(|id| self.model.graph.node(id).scope)
            .unwrap_or(ScopeId::MAIN)
    }

    fn path(&mut self, text: &str) -> QueryResult<PathExpr> {
        match self.session.parse(text)? {
            Expr::Path(path) => Ok(path),
            other => Err(QueryError::InvalidArgument(format!(
                "'{}' is not a path",
                other
            ))),
        }
    }

    /// `LEFT JOIN path alias ON ...`; the join is never shared with
    /// implicit joins.
    pub fn left_join_on(&mut self, path: &str, alias: &str) -> QueryResult<OnBuilder<'_, 'm>> {
        self.join_on(path, alias, JoinType::Left)
    }

    pub fn inner_join_on(&mut self, path: &str, alias: &str) -> QueryResult<OnBuilder<'_, 'm>> {
        self.join_on(path, alias, JoinType::Inner)
    }

    pub fn join_on(&mut self, path: &str, alias: &str, join_type: JoinType) -> QueryResult<OnBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("join_on")?;
        let join = self.explicit_join(path, alias, join_type, true)?;
        Ok(OnBuilder::new(self, join))
    }

    /// `[LEFT ]JOIN Entity alias ON ...` of an unrelated entity.
    pub fn join_on_entity(&mut self, entity: &str, alias: &str, join_type: JoinType) -> QueryResult<OnBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("join_on_entity")?;
        let mode = mode_for(self.model.kind);
        let join = speculate(
            self.metamodel,
            &self.config,
            &mut self.model.graph,
            ScopeId::MAIN,
            Clause::On,
            mode,
            |r| r.join_entity(entity, alias, join_type),
        )?;
        Ok(OnBuilder::new(self, join))
    }

    // =========================================================================
    // Parameters and pagination
    // =========================================================================

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("set_parameter")?;
        self.session.params.set(name, value.into());
        Ok(self)
    }

    pub fn set_first_result(&mut self, first_result: u64) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("set_first_result")?;
        self.model.first_result = first_result;
        Ok(self)
    }

    pub fn set_max_results(&mut self, max_results: u64) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("set_max_results")?;
        self.model.max_results = Some(max_results);
        Ok(self)
    }

    // =========================================================================
    // DML
    // =========================================================================

    /// `SET attribute = :param_n` of an UPDATE.
    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("set")?;
        self.ensure_kind(&[StatementKind::Update], "set")?;
        let value = self.session.bind(value.into());
        self.push_set(attribute, value)
    }

    /// `SET attribute = expression` of an UPDATE.
    pub fn set_expression(&mut self, attribute: &str, expression: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("set_expression")?;
        self.ensure_kind(&[StatementKind::Update], "set_expression")?;
        let value = self.session.parse(expression)?;
        let value = self.resolve(ScopeId::MAIN, Clause::Set, &value)?.expr;
        self.push_set(attribute, value)
    }

    fn push_set(&mut self, attribute: &str, value: Expr) -> QueryResult<&mut Self> {
        let target = self.parse_and_resolve(Clause::Set, attribute)?;
        if target.result_type.is_none() {
            return Err(QueryError::InvalidArgument(format!(
                "SET target '{}' is not an attribute path",
                attribute
            )));
        }
        self.model.set_clauses.push(SetClause {
            target: target.expr,
            value,
        });
        Ok(self)
    }

    /// Bind an attribute of the INSERT target to a select expression.
    pub fn bind(&mut self, attribute: &str, expression: &str) -> QueryResult<&mut Self> {
        self.session.builders.ensure_idle("bind")?;
        let Some(target) = self.model.insert.as_ref() else {
            return Err(QueryError::InvalidArgument(
                "bind is only available on INSERT statements".into(),
            ));
        };
        let entity_type = self
            .metamodel
            .entity_type(&target.entity)
            .ok_or_else(|| QueryError::UnknownType(target.entity.clone()))?;
        if self.metamodel.resolve_attribute(&entity_type, attribute).is_none() {
            return Err(QueryError::unknown_attribute(&entity_type, attribute));
        }
        if target.columns.iter().any(|c| c == attribute) {
            return Err(QueryError::InvalidArgument(format!(
                "attribute '{}' is already bound",
                attribute
            )));
        }
        let resolved = self.parse_and_resolve(Clause::Select, expression)?;
        let item = select_item(self.metamodel, &self.model.graph, resolved, None);
        self.model.select.push(item);
        if let Some(target) = self.model.insert.as_mut() {
            target.columns.push(attribute.to_string());
        }
        Ok(self)
    }

    // =========================================================================
    // CTEs
    // =========================================================================

    /// `WITH CteType(...) AS(...)`
    pub fn with_cte(&mut self, cte_type: &str) -> QueryResult<CteBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("with_cte")?;
        CteBuilder::new(self, cte_type, false)
    }

    /// `WITH RECURSIVE CteType(...) AS(base UNION ALL recursive)`
    pub fn with_recursive_cte(&mut self, cte_type: &str) -> QueryResult<CteBuilder<'_, 'm>> {
        self.session.builders.ensure_idle("with_recursive_cte")?;
        CteBuilder::new(self, cte_type, true)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    fn renderer(&self, action: &'static str) -> QueryResult<QueryRenderer<'_>> {
        self.session.builders.ensure_idle(action)?;
        Ok(QueryRenderer::new(
            &self.model,
            &self.config,
            self.metamodel,
            &self.session.params,
        ))
    }

    /// The statement text alone.
    pub fn query_string(&self) -> QueryResult<String> {
        Ok(self.statement()?.text)
    }

    /// The statement with its parameters, honoring first/max results.
    pub fn statement(&self) -> QueryResult<Statement> {
        self.renderer("statement")?.object()
    }

    /// `SELECT COUNT(...)` over the same restrictions.
    pub fn count_statement(&self) -> QueryResult<Statement> {
        self.renderer("count_statement")?.count()
    }

    /// `SELECT COUNT(DISTINCT root.id)` over the same restrictions.
    pub fn root_count_statement(&self) -> QueryResult<Statement> {
        self.renderer("root_count_statement")?.root_count()
    }

    /// Offset pagination: the bounded object query and its count queries.
    pub fn page(&self, first_result: u64, max_results: u64) -> QueryResult<PaginatedStatements> {
        self.renderer("page")?.page(first_result, max_results)
    }

    /// Keyset pagination relative to a previously fetched page.
    pub fn page_keyset(
        &self,
        previous: &KeysetPage,
        first_result: u64,
        max_results: u64,
    ) -> QueryResult<PaginatedStatements> {
        self.renderer("page_keyset")?
            .page_keyset(previous, first_result, max_results)
    }
}

impl PredicateSink for CriteriaBuilder<'_> {
    fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    fn accept(&mut self, clause: Clause, predicate: Expr) -> QueryResult<()> {
        let resolved = self.resolve(ScopeId::MAIN, clause, &predicate)?.expr;
        match clause {
            Clause::Where => self.model.where_clause.push(resolved),
            Clause::Having => self.model.having.push(resolved),
            other => {
                return Err(QueryError::InvalidArgument(format!(
                    "{:?} does not take predicates",
                    other
                )))
            }
        }
        Ok(())
    }
}

impl CaseSink for CriteriaBuilder<'_> {
    fn accept_case(&mut self, case: Expr, alias: Option<String>) -> QueryResult<()> {
        let resolved = self.resolve(ScopeId::MAIN, Clause::Select, &case)?;
        self.model.select.push(SelectItem {
            expr: resolved,
            alias,
            expansion: Vec::new(),
        });
        Ok(())
    }
}

// =============================================================================
// OnBuilder
// =============================================================================

/// Collects the ON predicates of an explicit join.
pub struct OnBuilder<'b, 'm> {
    parent: &'b mut CriteriaBuilder<'m>,
    join: JoinId,
    predicates: Vec<Expr>,
    depth: usize,
}

impl<'b, 'm> OnBuilder<'b, 'm> {
    fn new(parent: &'b mut CriteriaBuilder<'m>, join: JoinId) -> Self {
        let depth = parent.session.builders.push(ON);
        Self {
            parent,
            join,
            predicates: Vec::new(),
            depth,
        }
    }

    fn ensure(&self, action: &'static str) -> QueryResult<()> {
        self.parent
            .session
            .builders
            .ensure(self.depth, ON, BuilderState::Open, action)
    }

    /// Start an ON restriction on `expression`.
    pub fn on(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.ensure("on")?;
        let left = self.parent.session.parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::On, left))
    }

    pub fn on_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.ensure("on_expression")?;
        let predicate = self.parent.session.parse(predicate)?;
        self.predicates.push(predicate);
        Ok(self)
    }

    /// Resolve the collected predicates into the join's ON clause.
    pub fn end(&mut self) -> QueryResult<&mut CriteriaBuilder<'m>> {
        self.ensure("end")?;
        let Some(predicate) = Expr::conjunction(self.predicates.iter().cloned()) else {
            return Err(QueryError::InvalidArgument(format!(
                "ON clause of '{}' needs at least one predicate",
                self.parent.model.graph.node(self.join).alias
            )));
        };
        let parent = &mut *self.parent;
        let scope = parent.model.graph.node(self.join).scope;
        let mode = mode_for(parent.model.kind);
        let join = self.join;
        speculate(
            parent.metamodel,
            &parent.config,
            &mut parent.model.graph,
            scope,
            Clause::On,
            mode,
            |r| r.attach_on(join, &predicate),
        )?;
        self.predicates.clear();
        self.parent.session.builders.close(self.depth);
        Ok(&mut *self.parent)
    }
}

impl PredicateSink for OnBuilder<'_, '_> {
    fn session(&mut self) -> &mut Session {
        &mut self.parent.session
    }

    fn accept(&mut self, _clause: Clause, predicate: Expr) -> QueryResult<()> {
        self.predicates.push(predicate);
        Ok(())
    }
}

// =============================================================================
// SubqueryBuilder
// =============================================================================

/// Builds the subquery of a `[NOT] EXISTS` predicate in its own scope.
pub struct SubqueryBuilder<'b, 'm> {
    parent: &'b mut CriteriaBuilder<'m>,
    scope: ScopeId,
    negated: bool,
    select: Vec<Expr>,
    where_clause: Vec<Expr>,
    depth: usize,
}

impl<'b, 'm> SubqueryBuilder<'b, 'm> {
    fn new(parent: &'b mut CriteriaBuilder<'m>, negated: bool) -> Self {
        let depth = parent.session.builders.push(SUBQUERY);
        let scope = parent.model.graph.new_scope(ScopeId::MAIN);
        Self {
            parent,
            scope,
            negated,
            select: Vec::new(),
            where_clause: Vec::new(),
            depth,
        }
    }

    fn ensure(&self, action: &'static str) -> QueryResult<()> {
        self.parent
            .session
            .builders
            .ensure(self.depth, SUBQUERY, BuilderState::Open, action)
    }

    fn resolve(&mut self, clause: Clause, expr: &Expr) -> QueryResult<Expr> {
        let parent = &mut *self.parent;
        let mode = mode_for(parent.model.kind);
        speculate(
            parent.metamodel,
            &parent.config,
            &mut parent.model.graph,
            self.scope,
            clause,
            mode,
            |r| r.resolve_expr(expr),
        )
    }

    /// `FROM Entity alias` inside the subquery.
    pub fn from(&mut self, entity: &str, alias: &str) -> QueryResult<&mut Self> {
        self.ensure("from")?;
        let parent = &mut *self.parent;
        add_root(parent.metamodel, &mut parent.model.graph, entity, alias, self.scope)?;
        Ok(self)
    }

    /// `FROM outer.relation alias`, correlated with the enclosing query.
    pub fn from_path(&mut self, path: &str, alias: &str) -> QueryResult<&mut Self> {
        self.ensure("from_path")?;
        let path = self.parent.path(path)?;
        let parent = &mut *self.parent;
        let mode = mode_for(parent.model.kind);
        speculate(
            parent.metamodel,
            &parent.config,
            &mut parent.model.graph,
            self.scope,
            Clause::Where,
            mode,
            |r| r.correlated_root(&path, alias),
        )?;
        Ok(self)
    }

    pub fn select(&mut self, expression: &str) -> QueryResult<&mut Self> {
        self.ensure("select")?;
        let expr = self.parent.session.parse(expression)?;
        let resolved = self.resolve(Clause::Select, &expr)?;
        self.select.push(resolved);
        Ok(self)
    }

    pub fn where_(&mut self, expression: &str) -> QueryResult<RestrictionBuilder<'_, Self>> {
        self.ensure("where")?;
        let left = self.parent.session.parse(expression)?;
        Ok(RestrictionBuilder::new(self, Clause::Where, left))
    }

    pub fn where_expression(&mut self, predicate: &str) -> QueryResult<&mut Self> {
        self.ensure("where_expression")?;
        let predicate = self.parent.session.parse(predicate)?;
        self.accept(Clause::Where, predicate)?;
        Ok(self)
    }

    /// Close the subquery and add the EXISTS predicate to the parent.
    pub fn end(&mut self) -> QueryResult<&mut CriteriaBuilder<'m>> {
        self.ensure("end")?;
        if self.parent.model.graph.roots(self.scope).is_empty() {
            return Err(QueryError::InvalidArgument(
                "subquery needs at least one FROM item".into(),
            ));
        }
        let select = if self.select.is_empty() {
            vec![Expr::int(1)]
        } else {
            std::mem::take(&mut self.select)
        };
        let predicate = Expr::Exists {
            subquery: Box::new(Subquery {
                scope: self.scope,
                select,
                where_clause: Expr::conjunction(self.where_clause.drain(..)),
            }),
            negated: self.negated,
        };
        self.parent.session.builders.close(self.depth);
        self.parent.model.where_clause.push(predicate);
        Ok(&mut *self.parent)
    }
}

impl PredicateSink for SubqueryBuilder<'_, '_> {
    fn session(&mut self) -> &mut Session {
        &mut self.parent.session
    }

    fn accept(&mut self, clause: Clause, predicate: Expr) -> QueryResult<()> {
        let resolved = self.resolve(clause, &predicate)?;
        self.where_clause.push(resolved);
        Ok(())
    }
}
