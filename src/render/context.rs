//! Rendering context: resolves join ids to aliases and renders FROM clauses.

use std::collections::BTreeSet;

use crate::config::{Capabilities, QueryConfig};
use crate::join::{join_order, JoinGraph, JoinId, JoinOrigin, ScopeId};
use crate::sql::dialect::Dialect;
use crate::sql::expr::{Expr, Subquery};
use crate::sql::token::{Token, TokenStream};

/// Read-only view handed to [`Expr::to_tokens`].
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    graph: &'a JoinGraph,
    config: &'a QueryConfig,
}

impl<'a> RenderContext<'a> {
    pub fn new(graph: &'a JoinGraph, config: &'a QueryConfig) -> Self {
        Self { graph, config }
    }

    pub fn alias(&self, id: JoinId) -> &'a str {
        &self.graph.node(id).alias
    }

    pub fn graph(&self) -> &'a JoinGraph {
        self.graph
    }

    pub fn config(&self) -> &'a QueryConfig {
        self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn capabilities(&self) -> &'a Capabilities {
        &self.config.capabilities
    }

    /// Render an expression to text.
    pub fn render(&self, expr: &Expr) -> String {
        expr.to_tokens(self).serialize(self.dialect())
    }

    // =========================================================================
    // FROM clause
    // =========================================================================

    /// `FROM a, b JOIN ... LEFT JOIN ...` for a scope, keeping the joins
    /// `include` accepts.
    pub fn from_tokens(&self, scope: ScopeId, include: impl Fn(JoinId) -> bool) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::From).space();
        let roots: Vec<TokenStream> = self
            .graph
            .roots(scope)
            .into_iter()
            .map(|id| self.root_tokens(id))
            .collect();
        ts.append_comma_separated(&roots);

        for id in join_order(self.graph, scope, include) {
            ts.space().append(&self.join_tokens(id));
        }
        ts
    }

    fn root_tokens(&self, id: JoinId) -> TokenStream {
        let node = self.graph.node(id);
        let mut ts = TokenStream::new();
        match (node.origin, node.parent, &node.relation) {
            (JoinOrigin::Correlated, Some(parent), Some(relation)) => {
                ts.append(&self.alias_tokens(parent, node.parent_treat.as_deref()))
                    .push(Token::Dot)
                    .push(Token::Ident(relation.clone()));
            }
            _ => {
                ts.push(Token::Ident(node.entity_name.clone()));
            }
        }
        ts.space().push(Token::Ident(node.alias.clone()));
        ts
    }

    /// A join alias, as `TREAT(alias AS T)` when narrowed to a subtype.
    pub fn alias_tokens(&self, id: JoinId, treat: Option<&str>) -> TokenStream {
        let mut ts = TokenStream::new();
        let alias = Token::Ident(self.alias(id).to_string());
        match treat {
            Some(treat) => {
                ts.push(Token::Treat)
                    .lparen()
                    .push(alias)
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(treat.to_string()))
                    .rparen();
            }
            None => {
                ts.push(alias);
            }
        }
        ts
    }

    /// A single `[LEFT ]JOIN source alias[ ON predicate]` clause.
    pub fn join_tokens(&self, id: JoinId) -> TokenStream {
        let node = self.graph.node(id);
        let mut ts = TokenStream::new();
        if node.join_type == crate::join::JoinType::Left {
            ts.push(Token::Left).space();
        }
        ts.push(Token::Join).space();

        let mut source = TokenStream::new();
        match (node.parent, &node.relation) {
            (Some(parent), Some(relation)) => {
                source
                    .append(&self.alias_tokens(parent, node.parent_treat.as_deref()))
                    .push(Token::Dot)
                    .push(Token::Ident(relation.clone()));
            }
            _ => {
                source.push(Token::Ident(node.entity_name.clone()));
            }
        }

        match &node.treat {
            Some(treat) if node.origin != JoinOrigin::Entity => {
                ts.push(Token::Treat)
                    .lparen()
                    .append(&source)
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(treat.clone()))
                    .rparen();
            }
            _ => {
                ts.append(&source);
            }
        }
        ts.space().push(Token::Ident(node.alias.clone()));

        if let Some(on) = &node.on {
            ts.space().push(Token::On).space().append(&on.to_tokens(self));
        }
        ts
    }

    // =========================================================================
    // Subqueries
    // =========================================================================

    /// `SELECT ... FROM ... [WHERE ...]` of a correlated subquery.
    pub fn subquery_tokens(&self, subquery: &Subquery) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Select).space();
        let select: Vec<TokenStream> = subquery.select.iter().map(|e| e.to_tokens(self)).collect();
        ts.append_comma_separated(&select);
        ts.space().append(&self.from_tokens(subquery.scope, |_| true));
        if let Some(predicate) = &subquery.where_clause {
            ts.space().push(Token::Where).space().append(&predicate.to_tokens(self));
        }
        ts
    }

    // =========================================================================
    // Size transformation
    // =========================================================================

    /// Whether a size count must count distinct elements because other
    /// collection joins of the same scope multiply the rows.
    pub fn size_needs_distinct(&self, size_join: JoinId) -> bool {
        let scope = self.graph.node(size_join).scope;
        self.graph
            .joins(scope)
            .into_iter()
            .any(|id| id != size_join && self.graph.node(id).is_plural())
    }

    /// Joins reachable from `ids` through parents and ON dependencies.
    pub fn dependency_closure(&self, ids: impl IntoIterator<Item = JoinId>) -> BTreeSet<JoinId> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<JoinId> = ids.into_iter().collect();
        while let Some(id) = stack.pop() {
            if out.insert(id) {
                stack.extend(self.graph.dependencies(id));
            }
        }
        out
    }
}
