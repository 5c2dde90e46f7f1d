//! Path resolution and implicit join materialization.
//!
//! The [`Resolver`] replaces every [`Expr::Path`] leaf of a parsed
//! expression with an [`Expr::Attribute`] bound to a join node, creating
//! the joins the path implies on the way:
//!
//! - basic and embeddable attributes extend the dotted attribute path
//! - singular associations join eagerly, INNER when required
//! - plural attributes always LEFT JOIN; an index accessor becomes the ON
//!   clause of the join
//! - `TREAT` on an association creates (or reuses) a join keyed by the
//!   treat type; on a join alias it narrows that alias without a new join
//!
//! Joins are keyed canonically, so equivalent paths share one node.

use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::join::{decapitalize, JoinGraph, JoinId, JoinKey, JoinNode, JoinOrigin, JoinType, ScopeId};
use crate::metadata::{AttributeInfo, AttributeKind, Cardinality, Metamodel};
use crate::path::{IndexAccessor, PathExpr, PathSegment, ELEMENT_ALIAS};
use crate::sql::expr::{Expr, Literal, SizeCount, SizeIdentity, Subquery};

use super::model::ResolvedExpression;

/// Clause an expression is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    Having,
    GroupBy,
    OrderBy,
    On,
    Set,
    Returning,
}

/// Whether singular associations materialize joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveMode {
    #[default]
    Join,
    /// UPDATE and DELETE: associations stay in the dotted path, plural
    /// paths are rejected.
    PathOnly,
}

/// The value a path denotes after walking some of its segments.
#[derive(Debug, Clone)]
struct ResolvedPath {
    node: JoinId,
    /// Attribute names below `node`.
    pending: Vec<String>,
    type_name: String,
    kind: AttributeKind,
    cardinality: Cardinality,
    nullable: bool,
    /// A basic value: nothing can be dereferenced from it.
    terminal: bool,
    /// Ended on a collection used as a whole (SIZE, IS EMPTY, MEMBER OF).
    collection: bool,
    /// `node` narrowed by `TREAT(alias AS type_name)`.
    treat: Option<String>,
}

impl ResolvedPath {
    fn at(node: &JoinNode) -> Self {
        Self {
            node: node.id,
            pending: Vec::new(),
            type_name: node.entity_type.clone(),
            kind: node.element_kind,
            cardinality: Cardinality::Singular,
            nullable: node.nullable,
            terminal: node.element_kind == AttributeKind::Basic,
            collection: false,
            treat: None,
        }
    }

    fn expr(&self) -> Expr {
        match &self.treat {
            Some(treat) => Expr::treated_attr(self.node, treat, self.pending.clone()),
            None => Expr::attr(self.node, self.pending.clone()),
        }
    }

    fn relation(&self, name: &str) -> String {
        let mut parts = self.pending.clone();
        parts.push(name.to_string());
        parts.join(".")
    }
}

pub struct Resolver<'r> {
    metamodel: &'r dyn Metamodel,
    config: &'r QueryConfig,
    graph: &'r mut JoinGraph,
    scope: ScopeId,
    clause: Clause,
    mode: ResolveMode,
    /// Node the element alias `_` stands for.
    element: Option<JoinId>,
    /// Join re-rooted by the correlated EXISTS fallback, and its stand-in.
    substitute: Option<(JoinId, JoinId)>,
    aggregate_depth: usize,
}

impl<'r> Resolver<'r> {
    pub fn new(
        metamodel: &'r dyn Metamodel,
        config: &'r QueryConfig,
        graph: &'r mut JoinGraph,
        scope: ScopeId,
        clause: Clause,
    ) -> Self {
        Self {
            metamodel,
            config,
            graph,
            scope,
            clause,
            mode: ResolveMode::Join,
            element: None,
            substitute: None,
            aggregate_depth: 0,
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    fn nested(&mut self, scope: ScopeId, element: Option<JoinId>, substitute: Option<(JoinId, JoinId)>) -> Resolver<'_> {
        Resolver {
            metamodel: self.metamodel,
            config: self.config,
            graph: &mut *self.graph,
            scope,
            clause: self.clause,
            mode: self.mode,
            element,
            substitute,
            aggregate_depth: 0,
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Resolve an expression and collect its type facts.
    pub fn resolve(&mut self, expr: &Expr) -> QueryResult<ResolvedExpression> {
        let (resolved, result_type, nullable) = match expr {
            Expr::Path(path) => {
                let resolved = self.resolve_path(path, false)?;
                (resolved.expr(), Some(resolved.type_name), resolved.nullable)
            }
            other => {
                let resolved = self.resolve_expr(other)?;
                let nullable = !matches!(&resolved, Expr::Literal(lit) if *lit != Literal::Null);
                (resolved, None, nullable)
            }
        };
        Ok(ResolvedExpression::new(resolved, self.graph, result_type, nullable))
    }

    /// Resolve every path of an expression tree.
    pub fn resolve_expr(&mut self, expr: &Expr) -> QueryResult<Expr> {
        Ok(match expr {
            Expr::Path(path) => self.resolve_path(path, false)?.expr(),
            Expr::Attribute(_)
            | Expr::Parameter(_)
            | Expr::Literal(_)
            | Expr::Star
            | Expr::SizeCount(_)
            | Expr::Exists { .. }
            | Expr::Subquery(_) => expr.clone(),
            Expr::Binary { left, op, right } => {
                Expr::binary(self.resolve_expr(left)?, *op, self.resolve_expr(right)?)
            }
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: self.resolve_boxed(expr)?,
            },
            Expr::Function {
                name,
                args,
                distinct,
            } => self.resolve_function(name, args, *distinct)?,
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand = match operand {
                    Some(op) => Some(self.resolve_boxed(op)?),
                    None => None,
                };
                let mut whens = Vec::with_capacity(when_clauses.len());
                for (when, then) in when_clauses {
                    whens.push((self.resolve_expr(when)?, self.resolve_expr(then)?));
                }
                let else_clause = match else_clause {
                    Some(e) => Some(self.resolve_boxed(e)?),
                    None => None,
                };
                Expr::Case {
                    operand,
                    when_clauses: whens,
                    else_clause,
                }
            }
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: self.resolve_boxed(expr)?,
                values: self.resolve_all(values)?,
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: self.resolve_boxed(expr)?,
                low: self.resolve_boxed(low)?,
                high: self.resolve_boxed(high)?,
                negated: *negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: self.resolve_boxed(expr)?,
                negated: *negated,
            },
            Expr::IsEmpty { expr, negated } => Expr::IsEmpty {
                expr: Box::new(self.resolve_collection(expr)?),
                negated: *negated,
            },
            Expr::MemberOf {
                element,
                collection,
                negated,
            } => Expr::MemberOf {
                element: self.resolve_boxed(element)?,
                collection: Box::new(self.resolve_collection(collection)?),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
            } => Expr::Like {
                expr: self.resolve_boxed(expr)?,
                pattern: self.resolve_boxed(pattern)?,
                escape: match escape {
                    Some(e) => Some(self.resolve_boxed(e)?),
                    None => None,
                },
                negated: *negated,
            },
            Expr::Window {
                function,
                partition_by,
                order_by,
            } => {
                if !self.config.capabilities.supports_window_functions {
                    return Err(QueryError::unsupported("window functions", self.config.dialect));
                }
                self.in_aggregate(|r| {
                    let function = r.resolve_boxed(function)?;
                    let partition_by = r.resolve_all(partition_by)?;
                    let mut order = Vec::with_capacity(order_by.len());
                    for item in order_by {
                        let mut item = item.clone();
                        item.expr = r.resolve_expr(&item.expr)?;
                        order.push(item);
                    }
                    Ok(Expr::Window {
                        function,
                        partition_by,
                        order_by: order,
                    })
                })?
            }
            Expr::Paren(inner) => Expr::Paren(self.resolve_boxed(inner)?),
            Expr::RowComparison { op, left, right } => Expr::RowComparison {
                op: *op,
                left: self.resolve_all(left)?,
                right: self.resolve_all(right)?,
            },
        })
    }

    fn resolve_boxed(&mut self, expr: &Expr) -> QueryResult<Box<Expr>> {
        Ok(Box::new(self.resolve_expr(expr)?))
    }

    fn resolve_all(&mut self, exprs: &[Expr]) -> QueryResult<Vec<Expr>> {
        exprs.iter().map(|e| self.resolve_expr(e)).collect()
    }

    fn resolve_collection(&mut self, expr: &Expr) -> QueryResult<Expr> {
        match expr {
            Expr::Path(path) => Ok(self.resolve_path(path, true)?.expr()),
            other => self.resolve_expr(other),
        }
    }

    fn in_aggregate<T>(&mut self, f: impl FnOnce(&mut Self) -> QueryResult<T>) -> QueryResult<T> {
        self.aggregate_depth += 1;
        let result = f(self);
        self.aggregate_depth -= 1;
        result
    }

    fn resolve_function(&mut self, name: &str, args: &[Expr], distinct: bool) -> QueryResult<Expr> {
        if name.eq_ignore_ascii_case("SIZE") {
            if let [Expr::Path(path)] = args {
                return self.resolve_size(path);
            }
        }
        let args = if self.config.functions.is_aggregate(name) {
            self.in_aggregate(|r| r.resolve_all(args))?
        } else {
            self.resolve_all(args)?
        };
        Ok(Expr::Function {
            name: name.to_string(),
            args,
            distinct,
        })
    }

    // =========================================================================
    // Paths
    // =========================================================================

    fn resolve_path(&mut self, path: &PathExpr, collection_usage: bool) -> QueryResult<ResolvedPath> {
        let (start, rest) = self.resolve_start(path)?;
        self.walk(start, rest, collection_usage, path)
    }

    /// Determine the node the first segment denotes and the segments left
    /// to walk from it.
    fn resolve_start<'p>(&mut self, path: &'p PathExpr) -> QueryResult<(ResolvedPath, &'p [PathSegment])> {
        let Some(first) = path.first() else {
            return Err(QueryError::syntax("empty path", 0..0));
        };

        if first.name == ELEMENT_ALIAS {
            let element = self.element.ok_or_else(|| {
                QueryError::syntax("element alias '_' used outside an index predicate", 0..0)
            })?;
            if first.index.is_some() || first.treat.is_some() {
                return Err(QueryError::syntax(
                    "the element alias cannot be indexed or treated",
                    0..0,
                ));
            }
            return Ok((ResolvedPath::at(self.graph.node(element)), &path.segments[1..]));
        }

        if let Some(found) = self.graph.find_alias(&first.name, self.scope) {
            let id = self.substituted(found);
            if first.index.is_some() {
                return Err(QueryError::syntax(
                    format!("alias '{}' cannot be indexed", first.name),
                    0..0,
                ));
            }
            let start = match &first.treat {
                Some(treat) => self.treat_alias(id, treat)?,
                None => ResolvedPath::at(self.graph.node(id)),
            };
            return Ok((start, &path.segments[1..]));
        }

        let roots = self.graph.roots(self.scope);
        let candidates: Vec<JoinId> = roots
            .iter()
            .copied()
            .filter(|r| {
                self.metamodel
                    .resolve_attribute(&self.graph.node(*r).entity_type, &first.name)
                    .is_some()
            })
            .collect();
        let entity = self.metamodel.entity_type(&first.name);

        if candidates.len() > 1 || (candidates.len() == 1 && entity.is_some()) {
            let mut names: Vec<String> = candidates
                .iter()
                .map(|id| self.graph.node(*id).alias.clone())
                .collect();
            names.extend(entity);
            return Err(QueryError::AmbiguousRoot {
                identifier: first.name.clone(),
                candidates: names,
            });
        }
        if let Some(root) = candidates.first() {
            let root = self.substituted(*root);
            return Ok((ResolvedPath::at(self.graph.node(root)), &path.segments[..]));
        }
        if let Some(entity) = entity {
            if first.index.is_some() || first.treat.is_some() {
                return Err(QueryError::syntax(
                    format!("entity '{}' cannot be indexed or treated", first.name),
                    0..0,
                ));
            }
            let root = self.implicit_root(&first.name, &entity);
            return Ok((ResolvedPath::at(self.graph.node(root)), &path.segments[1..]));
        }

        match roots.first() {
            None => Err(QueryError::UnknownAlias(first.name.clone())),
            Some(root) => Err(QueryError::unknown_attribute(
                &self.graph.node(*root).entity_type,
                &first.name,
            )),
        }
    }

    fn substituted(&self, id: JoinId) -> JoinId {
        match self.substitute {
            Some((from, to)) if from == id => to,
            _ => id,
        }
    }

    fn implicit_root(&mut self, name: &str, entity: &str) -> JoinId {
        let existing = self.graph.roots(self.scope).into_iter().find(|r| {
            let node = self.graph.node(*r);
            node.origin == JoinOrigin::ImplicitRoot && node.entity_type == entity
        });
        if let Some(id) = existing {
            return id;
        }
        let alias = self.graph.generate_alias(&decapitalize(name));
        self.graph.add_node(JoinNode {
            alias,
            scope: self.scope,
            origin: JoinOrigin::ImplicitRoot,
            entity_type: entity.to_string(),
            entity_name: self.metamodel.entity_name(entity),
            join_type: JoinType::Inner,
            ..Default::default()
        })
    }

    /// `TREAT(alias AS Sub)` on a join alias narrows the alias in place: the
    /// same join node seen as the subtype, with no join of its own.
    fn treat_alias(&self, id: JoinId, treat: &str) -> QueryResult<ResolvedPath> {
        let node = self.graph.node(id);
        if node.origin.is_root() || node.parent.is_none() {
            return Err(QueryError::syntax(
                format!("TREAT of root alias '{}' is not allowed", node.alias),
                0..0,
            ));
        }
        let mut view = ResolvedPath::at(node);
        if node.treat.as_deref() == Some(treat) {
            return Ok(view);
        }
        if !self.metamodel.is_subtype(treat, &node.entity_type) {
            return Err(QueryError::syntax(
                format!("'{}' is not a subtype of '{}'", treat, node.entity_type),
                0..0,
            ));
        }
        view.type_name = treat.to_string();
        view.treat = Some(treat.to_string());
        Ok(view)
    }

    fn walk(
        &mut self,
        mut walk: ResolvedPath,
        segments: &[PathSegment],
        collection_usage: bool,
        path: &PathExpr,
    ) -> QueryResult<ResolvedPath> {
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            let attr = self.attribute(&walk, segment)?;

            if attr.cardinality.is_plural() {
                if collection_usage && is_last && segment.index.is_none() && segment.treat.is_none() {
                    walk.pending.push(segment.name.clone());
                    walk.type_name = attr.target_type;
                    walk.kind = attr.kind;
                    walk.cardinality = attr.cardinality;
                    walk.terminal = true;
                    walk.collection = true;
                    continue;
                }
                if self.mode == ResolveMode::PathOnly {
                    return Err(QueryError::unsupported(
                        format!("collection path '{}' in a DML statement", path),
                        self.config.dialect,
                    ));
                }
                let id = self.join_plural(&walk, segment, &attr)?;
                walk = ResolvedPath::at(self.graph.node(id));
                continue;
            }

            match attr.kind {
                AttributeKind::Basic | AttributeKind::Embeddable => {
                    walk.pending.push(segment.name.clone());
                    walk.type_name = attr.target_type;
                    walk.kind = attr.kind;
                    walk.nullable |= attr.nullable;
                    walk.terminal = attr.kind == AttributeKind::Basic;
                }
                AttributeKind::Entity => {
                    let path_only = self.mode == ResolveMode::PathOnly;
                    if path_only && segment.treat.is_some() {
                        return Err(QueryError::unsupported(
                            format!("TREAT in DML path '{}'", path),
                            self.config.dialect,
                        ));
                    }
                    if path_only || self.id_shortcut(&attr, segment, &segments[i + 1..]) {
                        walk.pending.push(segment.name.clone());
                        walk.type_name = attr.target_type;
                        walk.kind = AttributeKind::Entity;
                        walk.nullable |= attr.nullable;
                    } else {
                        let id = self.join_singular(&walk, segment, &attr)?;
                        walk = ResolvedPath::at(self.graph.node(id));
                    }
                }
            }
        }
        Ok(walk)
    }

    /// Look up and validate the attribute a segment names.
    fn attribute(&self, walk: &ResolvedPath, segment: &PathSegment) -> QueryResult<AttributeInfo> {
        if walk.terminal {
            return Err(QueryError::unknown_attribute(&walk.type_name, &segment.name));
        }
        let attr = self
            .metamodel
            .resolve_attribute(&walk.type_name, &segment.name)
            .ok_or_else(|| QueryError::unknown_attribute(&walk.type_name, &segment.name))?;
        if segment.index.is_some() && !attr.cardinality.is_indexed() {
            return Err(QueryError::InvalidArgument(format!(
                "'{}' is neither a list nor a map and cannot be indexed",
                segment.name
            )));
        }
        if let Some(treat) = &segment.treat {
            if attr.kind != AttributeKind::Entity {
                return Err(QueryError::syntax(
                    format!("TREAT needs an entity attribute, '{}' is not one", segment.name),
                    0..0,
                ));
            }
            if !self.metamodel.is_subtype(treat, &attr.target_type) {
                return Err(QueryError::syntax(
                    format!("'{}' is not a subtype of '{}'", treat, attr.target_type),
                    0..0,
                ));
            }
        }
        Ok(attr)
    }

    /// `assoc.id` as the last two segments renders without a join when
    /// `id_access_without_join` is on.
    fn id_shortcut(&self, attr: &AttributeInfo, segment: &PathSegment, rest: &[PathSegment]) -> bool {
        if !self.config.id_access_without_join || segment.treat.is_some() {
            return false;
        }
        match rest {
            [next] => {
                next.index.is_none()
                    && next.treat.is_none()
                    && self.metamodel.id_attribute(&attr.target_type).as_deref() == Some(next.name.as_str())
            }
            _ => false,
        }
    }

    // =========================================================================
    // Joins
    // =========================================================================

    fn join_singular(&mut self, walk: &ResolvedPath, segment: &PathSegment, attr: &AttributeInfo) -> QueryResult<JoinId> {
        let relation = walk.relation(&segment.name);
        let key = JoinKey {
            parent: walk.node,
            relation: relation.clone(),
            index: None,
            treat: segment.treat.clone(),
            parent_treat: walk.treat.clone(),
            size: false,
        };
        if let Some(id) = self.graph.lookup(&key) {
            log::trace!("reusing join {} for {}", self.graph.node(id).alias, relation);
            return Ok(id);
        }

        let join_type = if attr.nullable || walk.nullable {
            JoinType::Left
        } else {
            JoinType::Inner
        };
        let entity_type = segment.treat.clone().unwrap_or_else(|| attr.target_type.clone());
        let alias = self.graph.generate_alias(&segment.name);
        let id = self.graph.add_node(JoinNode {
            alias,
            scope: self.graph.node(walk.node).scope,
            origin: JoinOrigin::Implicit,
            parent: Some(walk.node),
            relation: Some(relation),
            entity_name: self.metamodel.entity_name(&entity_type),
            entity_type,
            element_kind: AttributeKind::Entity,
            join_type,
            treat: segment.treat.clone(),
            parent_treat: walk.treat.clone(),
            nullable: join_type == JoinType::Left,
            ..Default::default()
        });
        self.graph.insert_key(key, id);
        Ok(id)
    }

    fn join_plural(&mut self, walk: &ResolvedPath, segment: &PathSegment, attr: &AttributeInfo) -> QueryResult<JoinId> {
        let relation = walk.relation(&segment.name);
        let normalized = segment
            .index
            .as_ref()
            .map(|index| normalize_index(index, attr.cardinality));
        let key = JoinKey {
            parent: walk.node,
            relation: relation.clone(),
            index: normalized.as_ref().map(|p| p.to_string()),
            treat: segment.treat.clone(),
            parent_treat: walk.treat.clone(),
            size: false,
        };
        if let Some(id) = self.graph.lookup(&key) {
            log::trace!("reusing join {} for {}", self.graph.node(id).alias, relation);
            return Ok(id);
        }

        let base = match segment.index.as_ref().and_then(|index| index.keyed_value()) {
            Some(value) => format!("{}_{}", segment.name, value),
            None => segment.name.clone(),
        };
        let entity_type = segment.treat.clone().unwrap_or_else(|| attr.target_type.clone());
        let alias = self.graph.generate_alias(&base);
        let id = self.graph.add_node(JoinNode {
            alias,
            scope: self.graph.node(walk.node).scope,
            origin: JoinOrigin::Implicit,
            parent: Some(walk.node),
            relation: Some(relation),
            entity_name: self.metamodel.entity_name(&entity_type),
            entity_type,
            cardinality: attr.cardinality,
            element_kind: attr.kind,
            join_type: JoinType::Left,
            treat: segment.treat.clone(),
            parent_treat: walk.treat.clone(),
            nullable: true,
            index_signature: key.index.clone(),
            ..Default::default()
        });
        self.graph.insert_key(key, id);
        if let Some(predicate) = normalized {
            self.attach_on(id, &predicate)?;
        }
        Ok(id)
    }

    /// Resolve an ON predicate for `node` with `_` bound to it. When the
    /// predicate needs joins hanging off `node` itself, it is re-resolved as
    /// a correlated EXISTS over a re-rooted copy of the element.
    pub fn attach_on(&mut self, node: JoinId, predicate: &Expr) -> QueryResult<()> {
        let checkpoint = self.graph.checkpoint();
        let saved = self.element.replace(node);
        let resolved = self.resolve_expr(predicate);
        self.element = saved;
        let resolved = resolved?;

        let existing = self.graph.node(node).on.clone();
        let combined = match existing.clone() {
            Some(on) => Expr::and(on, resolved),
            None => resolved,
        };
        if !self.graph.creates_cycle_with(node, &combined) {
            self.graph.node_mut(node).on = Some(combined);
            return Ok(());
        }

        self.graph.rollback(checkpoint);
        log::debug!(
            "ON clause of {} depends on its own joins, rewriting to a correlated EXISTS",
            self.graph.node(node).alias
        );
        let fallback = self.correlated_fallback(node, predicate)?;
        self.graph.node_mut(node).on = Some(match existing {
            Some(on) => Expr::and(on, fallback),
            None => fallback,
        });
        Ok(())
    }

    fn correlated_fallback(&mut self, node: JoinId, predicate: &Expr) -> QueryResult<Expr> {
        if !self.config.capabilities.supports_entity_join {
            return Err(QueryError::unsupported(
                "correlated EXISTS for a cyclic ON clause",
                self.config.dialect,
            ));
        }
        let target = self.graph.node(node).clone();
        if target.element_kind != AttributeKind::Entity {
            return Err(QueryError::unsupported(
                format!(
                    "re-rooting the non-entity element '{}' of type {}",
                    target.alias, target.entity_type
                ),
                self.config.dialect,
            ));
        }

        let scope = self.graph.new_scope(target.scope);
        let alias = format!("_synthetic_{}", target.alias);
        self.graph.register_alias(&alias)?;
        let root = self.graph.add_node(JoinNode {
            alias,
            scope,
            origin: JoinOrigin::Synthetic,
            entity_type: target.entity_type.clone(),
            entity_name: target.entity_name.clone(),
            join_type: JoinType::Inner,
            ..Default::default()
        });
        let inner = self
            .nested(scope, Some(root), Some((node, root)))
            .resolve_expr(predicate)?;
        let correlation = Expr::eq(Expr::alias(root), Expr::alias(node));
        Ok(Expr::Exists {
            subquery: Box::new(Subquery {
                scope,
                select: vec![Expr::int(1)],
                where_clause: Some(Expr::and(inner, correlation)),
            }),
            negated: false,
        })
    }

    // =========================================================================
    // SIZE
    // =========================================================================

    fn resolve_size(&mut self, path: &PathExpr) -> QueryResult<Expr> {
        let target = self.resolve_path(path, true)?;
        if !target.collection {
            return Err(QueryError::InvalidArgument(format!(
                "SIZE needs a collection path, '{}' is not one",
                path
            )));
        }
        if self.clause != Clause::Select {
            return Ok(Expr::function("SIZE", vec![target.expr()]));
        }

        let owner = target.node;
        let relation = target.pending.join(".");
        let name = target.pending.last().cloned().unwrap_or_default();
        let transform = self.aggregate_depth == 0
            && self.config.size_to_count
            && self.mode == ResolveMode::Join
            && target.cardinality != Cardinality::Bag;

        if transform {
            let key = JoinKey {
                parent: owner,
                relation: relation.clone(),
                index: None,
                treat: None,
                parent_treat: target.treat.clone(),
                size: true,
            };
            let join = match self.graph.lookup(&key) {
                Some(id) => id,
                None => {
                    let alias = self.graph.generate_alias(&name);
                    let id = self.graph.add_node(JoinNode {
                        alias,
                        scope: self.graph.node(owner).scope,
                        origin: JoinOrigin::Implicit,
                        parent: Some(owner),
                        relation: Some(relation),
                        entity_name: self.metamodel.entity_name(&target.type_name),
                        entity_type: target.type_name.clone(),
                        cardinality: target.cardinality,
                        element_kind: target.kind,
                        join_type: JoinType::Left,
                        parent_treat: target.treat.clone(),
                        nullable: true,
                        ..Default::default()
                    });
                    self.graph.insert_key(key, id);
                    id
                }
            };
            let identity = match (target.cardinality, target.kind) {
                (Cardinality::Map, _) => SizeIdentity::Key,
                (Cardinality::List, _) => SizeIdentity::Index,
                (_, AttributeKind::Entity) => self
                    .metamodel
                    .id_attribute(&target.type_name)
                    .map(SizeIdentity::Id)
                    .unwrap_or(SizeIdentity::Value),
                _ => SizeIdentity::Value,
            };
            log::debug!(
                "SIZE({}) becomes a grouped count over {}",
                path,
                self.graph.node(join).alias
            );
            return Ok(Expr::SizeCount(SizeCount {
                join,
                owner,
                identity,
            }));
        }

        log::debug!("SIZE({}) becomes a correlated count subquery", path);
        let scope = self.graph.new_scope(self.scope);
        let alias = self.graph.generate_plain_alias(&decapitalize(&target.type_name));
        self.graph.add_node(JoinNode {
            alias,
            scope,
            origin: JoinOrigin::Correlated,
            parent: Some(owner),
            relation: Some(relation),
            entity_name: self.metamodel.entity_name(&target.type_name),
            entity_type: target.type_name,
            cardinality: target.cardinality,
            element_kind: target.kind,
            join_type: JoinType::Inner,
            ..Default::default()
        });
        Ok(Expr::Subquery(Box::new(Subquery {
            scope,
            select: vec![Expr::function("COUNT", vec![Expr::Star])],
            where_clause: None,
        })))
    }

    // =========================================================================
    // Explicit joins and roots
    // =========================================================================

    /// Walk all segments but the last and return the owner of the last one
    /// with its attribute.
    fn association<'p>(&mut self, path: &'p PathExpr) -> QueryResult<(ResolvedPath, &'p PathSegment, AttributeInfo)> {
        let (start, rest) = self.resolve_start(path)?;
        let Some((last, middle)) = rest.split_last() else {
            return Err(QueryError::InvalidArgument(format!(
                "'{}' does not name an association",
                path
            )));
        };
        let owner = self.walk(start, middle, false, path)?;
        let attr = self.attribute(&owner, last)?;
        if !attr.cardinality.is_plural() && attr.kind != AttributeKind::Entity {
            return Err(QueryError::InvalidArgument(format!(
                "'{}' is not an association and cannot be joined",
                path
            )));
        }
        Ok((owner, last, attr))
    }

    /// `join(path, alias, type)`. A compatible implicit join already keyed
    /// by the path is promoted instead of joining twice.
    pub fn join_explicit(
        &mut self,
        path: &PathExpr,
        alias: &str,
        join_type: JoinType,
        with_on: bool,
    ) -> QueryResult<JoinId> {
        if self.graph.is_alias_used(alias) {
            return Err(QueryError::illegal_override(alias, "alias is already in use"));
        }
        let (owner, segment, attr) = self.association(path)?;
        let relation = owner.relation(&segment.name);
        let normalized = segment
            .index
            .as_ref()
            .map(|index| normalize_index(index, attr.cardinality));
        let key = JoinKey {
            parent: owner.node,
            relation: relation.clone(),
            index: normalized.as_ref().map(|p| p.to_string()),
            treat: segment.treat.clone(),
            parent_treat: owner.treat.clone(),
            size: false,
        };

        let existing = if with_on { None } else { self.graph.lookup(&key) };
        if let Some(id) = existing {
            let node = self.graph.node(id).clone();
            if !matches!(node.origin, JoinOrigin::Explicit | JoinOrigin::Entity) {
                if node.join_type != join_type {
                    return Err(QueryError::illegal_override(
                        alias,
                        format!(
                            "'{}' is already joined by {} as {}",
                            path, node.join_type, node.alias
                        ),
                    ));
                }
                self.graph.node_mut(id).origin = JoinOrigin::Explicit;
                self.graph.rename(id, alias)?;
                log::debug!("promoted implicit join {} to explicit {}", node.alias, alias);
                return Ok(id);
            }
        }

        self.graph.register_alias(alias)?;
        let entity_type = segment.treat.clone().unwrap_or_else(|| attr.target_type.clone());
        let id = self.graph.add_node(JoinNode {
            alias: alias.to_string(),
            scope: self.graph.node(owner.node).scope,
            origin: JoinOrigin::Explicit,
            parent: Some(owner.node),
            relation: Some(relation),
            entity_name: self.metamodel.entity_name(&entity_type),
            entity_type,
            cardinality: attr.cardinality,
            element_kind: attr.kind,
            join_type,
            treat: segment.treat.clone(),
            parent_treat: owner.treat.clone(),
            nullable: join_type == JoinType::Left || owner.nullable,
            index_signature: key.index.clone(),
            ..Default::default()
        });
        if !with_on && existing.is_none() {
            self.graph.insert_key(key, id);
        }
        if let Some(predicate) = normalized {
            self.attach_on(id, &predicate)?;
        }
        Ok(id)
    }

    /// `join_on(Entity, alias, type)`: an ad-hoc join of an unrelated entity.
    pub fn join_entity(&mut self, entity: &str, alias: &str, join_type: JoinType) -> QueryResult<JoinId> {
        if !self.config.capabilities.supports_entity_join {
            return Err(QueryError::unsupported("entity joins", self.config.dialect));
        }
        let entity_type = self
            .metamodel
            .entity_type(entity)
            .ok_or_else(|| QueryError::UnknownType(entity.to_string()))?;
        self.graph.register_alias(alias)?;
        Ok(self.graph.add_node(JoinNode {
            alias: alias.to_string(),
            scope: self.scope,
            origin: JoinOrigin::Entity,
            entity_name: self.metamodel.entity_name(&entity_type),
            entity_type,
            join_type,
            nullable: join_type == JoinType::Left,
            ..Default::default()
        }))
    }

    /// `FROM owner.relation alias` of a correlated subquery in this
    /// resolver's scope.
    pub fn correlated_root(&mut self, path: &PathExpr, alias: &str) -> QueryResult<JoinId> {
        let (owner, segment, attr) = self.association(path)?;
        if segment.index.is_some() {
            return Err(QueryError::InvalidArgument(format!(
                "correlated root '{}' cannot be indexed",
                path
            )));
        }
        self.graph.register_alias(alias)?;
        let entity_type = segment.treat.clone().unwrap_or_else(|| attr.target_type.clone());
        Ok(self.graph.add_node(JoinNode {
            alias: alias.to_string(),
            scope: self.scope,
            origin: JoinOrigin::Correlated,
            parent: Some(owner.node),
            relation: Some(owner.relation(&segment.name)),
            entity_name: self.metamodel.entity_name(&entity_type),
            entity_type,
            cardinality: attr.cardinality,
            element_kind: attr.kind,
            join_type: JoinType::Inner,
            parent_treat: owner.treat.clone(),
            ..Default::default()
        }))
    }
}

/// The index accessor as a predicate over `_`, with `KEY(_)` spelled
/// `INDEX(_)` for lists.
fn normalize_index(index: &IndexAccessor, cardinality: Cardinality) -> Expr {
    let mut predicate = index.normalized_predicate();
    if cardinality == Cardinality::List {
        predicate.walk_mut(&mut |e| {
            if let Expr::Function { name, args, .. } = e {
                let on_element = matches!(
                    args.as_slice(),
                    [Expr::Path(p)] if p.segments.len() == 1 && p.is_element_rooted()
                );
                if on_element && name.eq_ignore_ascii_case("KEY") {
                    *name = "INDEX".to_string();
                }
            }
        });
    }
    predicate
}
