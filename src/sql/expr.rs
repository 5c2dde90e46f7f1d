//! Expression AST - the core of predicate and projection building.
//!
//! The same tree is produced by the path parser (with unresolved
//! [`Expr::Path`] leaves) and consumed by the renderer after the resolver
//! has replaced every path with an [`Expr::Attribute`] bound to a join node.

use std::collections::BTreeSet;
use std::fmt;

use super::dialect::SqlDialect;
use super::token::{Token, TokenStream};
use crate::join::{JoinGraph, JoinId, ScopeId};
use crate::path::PathExpr;
use crate::render::RenderContext;

// =============================================================================
// Expression AST
// =============================================================================

/// A query expression.
///
/// Every variant must be handled in `to_tokens()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Unresolved attribute path as written by the caller.
    Path(PathExpr),

    /// Resolved attribute: `alias.embedded.attr` relative to a join node.
    Attribute(AttrRef),

    /// Named parameter `:name`
    Parameter(String),

    /// Literal values
    Literal(Literal),

    /// Binary operation: left op right
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    Unary { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// `*` inside `COUNT(*)`
    Star,

    /// CASE WHEN... THEN... ELSE... END
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// BETWEEN: expr BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// IS EMPTY / IS NOT EMPTY over a collection path
    IsEmpty { expr: Box<Expr>, negated: bool },

    /// element [NOT] MEMBER OF collection
    MemberOf {
        element: Box<Expr>,
        collection: Box<Expr>,
        negated: bool,
    },

    /// LIKE with optional ESCAPE
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        negated: bool,
    },

    /// Window function expression.
    ///
    /// Example: `SUM(d.age) OVER (PARTITION BY d.owner ORDER BY d.name)`
    Window {
        /// The function being windowed (usually Expr::Function)
        function: Box<Expr>,
        /// PARTITION BY expressions
        partition_by: Vec<Expr>,
        /// ORDER BY within window
        order_by: Vec<WindowOrderBy>,
    },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// [NOT] EXISTS (subquery)
    Exists {
        subquery: Box<Subquery>,
        negated: bool,
    },

    /// Scalar subquery: (SELECT ...)
    Subquery(Box<Subquery>),

    /// Collection size rewritten into a grouped count.
    SizeCount(SizeCount),

    /// Row-value comparison: (a, b) > (c, d)
    RowComparison {
        op: BinaryOperator,
        left: Vec<Expr>,
        right: Vec<Expr>,
    },
}

/// Reference to an attribute reachable from a join node without further joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrRef {
    pub join: JoinId,
    /// Embeddable and basic attribute names below the join node. Empty means
    /// the node itself.
    pub path: Vec<String>,
    /// Subtype the join alias is narrowed to: `TREAT(alias AS T).path`.
    pub treat: Option<String>,
}

/// A correlated subquery living in its own join scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub scope: ScopeId,
    pub select: Vec<Expr>,
    pub where_clause: Option<Expr>,
}

/// What a size count counts per owner row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeIdentity {
    /// Map key
    Key,
    /// List index
    Index,
    /// Id attribute of an entity element
    Id(String),
    /// Basic element value
    Value,
}

/// `SIZE(owner.rel)` rewritten to a count over a dedicated LEFT join.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeCount {
    /// The dedicated size join.
    pub join: JoinId,
    /// The node owning the collection.
    pub owner: JoinId,
    pub identity: SizeIdentity,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    // String
    Concat,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Lte
                | BinaryOperator::Gte
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Concat => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

// =============================================================================
// Ordering Types
// =============================================================================

/// Sort direction (shared with query ORDER BY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn flip(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

/// NULLS ordering (shared with query ORDER BY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsOrder {
    First,
    #[default]
    Last,
}

impl NullsOrder {
    pub fn flip(self) -> Self {
        match self {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        }
    }
}

/// ORDER BY expression within a window specification.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOrderBy {
    pub expr: Expr,
    pub dir: Option<SortDir>,
    pub nulls: Option<NullsOrder>,
}

// =============================================================================
// Constructors
// =============================================================================

impl Expr {
    pub fn attr(join: JoinId, path: Vec<String>) -> Expr {
        Expr::Attribute(AttrRef { join, path, treat: None })
    }

    pub fn treated_attr(join: JoinId, treat: impl Into<String>, path: Vec<String>) -> Expr {
        Expr::Attribute(AttrRef {
            join,
            path,
            treat: Some(treat.into()),
        })
    }

    pub fn alias(join: JoinId) -> Expr {
        Expr::attr(join, vec![])
    }

    pub fn param(name: impl Into<String>) -> Expr {
        Expr::Parameter(name.into())
    }

    pub fn int(n: i64) -> Expr {
        Expr::Literal(Literal::Int(n))
    }

    pub fn string(s: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Or, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(left, BinaryOperator::Eq, right)
    }

    pub fn is_null(expr: Expr, negated: bool) -> Expr {
        Expr::IsNull {
            expr: Box::new(expr),
            negated,
        }
    }

    pub fn paren(expr: Expr) -> Expr {
        Expr::Paren(Box::new(expr))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Function {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    /// Join a list of predicates with AND. Returns None for an empty list.
    pub fn conjunction(predicates: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        predicates.into_iter().reduce(Expr::and)
    }

    /// `1 = 0`
    pub fn always_false() -> Expr {
        Expr::eq(Expr::int(1), Expr::int(0))
    }

    /// Whether the expression yields a boolean, used to tell index
    /// predicates from index values.
    pub fn is_predicate(&self) -> bool {
        match self {
            Expr::Binary { op, .. } => op.is_comparison() || op.is_logical(),
            Expr::Unary {
                op: UnaryOperator::Not,
                ..
            } => true,
            Expr::Paren(inner) => inner.is_predicate(),
            Expr::In { .. }
            | Expr::Between { .. }
            | Expr::IsNull { .. }
            | Expr::IsEmpty { .. }
            | Expr::MemberOf { .. }
            | Expr::Like { .. }
            | Expr::Exists { .. }
            | Expr::RowComparison { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Traversal
// =============================================================================

impl Expr {
    /// Direct children, including index expressions of unresolved paths and
    /// the clauses of subqueries.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Path(path) => path.index_exprs(),
            Expr::Attribute(_)
            | Expr::Parameter(_)
            | Expr::Literal(_)
            | Expr::Star
            | Expr::SizeCount(_) => vec![],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { expr, .. } => vec![expr],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut out: Vec<&Expr> = Vec::new();
                if let Some(op) = operand {
                    out.push(op);
                }
                for (when, then) in when_clauses {
                    out.push(when);
                    out.push(then);
                }
                if let Some(e) = else_clause {
                    out.push(e);
                }
                out
            }
            Expr::In { expr, values, .. } => {
                let mut out: Vec<&Expr> = vec![expr];
                out.extend(values.iter());
                out
            }
            Expr::Between {
                expr, low, high, ..
            } => vec![expr, low, high],
            Expr::IsNull { expr, .. } | Expr::IsEmpty { expr, .. } => vec![expr],
            Expr::MemberOf {
                element,
                collection,
                ..
            } => vec![element, collection],
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out: Vec<&Expr> = vec![expr, pattern];
                if let Some(e) = escape {
                    out.push(e);
                }
                out
            }
            Expr::Window {
                function,
                partition_by,
                order_by,
            } => {
                let mut out: Vec<&Expr> = vec![function];
                out.extend(partition_by.iter());
                out.extend(order_by.iter().map(|o| &o.expr));
                out
            }
            Expr::Paren(inner) => vec![inner],
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
                let mut out: Vec<&Expr> = subquery.select.iter().collect();
                if let Some(w) = &subquery.where_clause {
                    out.push(w);
                }
                out
            }
            Expr::RowComparison { left, right, .. } => left.iter().chain(right.iter()).collect(),
        }
    }

    /// Pre-order walk over the tree.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Mutable pre-order walk. Unresolved path index expressions are not visited.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        f(self);
        match self {
            Expr::Path(_)
            | Expr::Attribute(_)
            | Expr::Parameter(_)
            | Expr::Literal(_)
            | Expr::Star
            | Expr::SizeCount(_) => {}
            Expr::Binary { left, right, .. } => {
                left.walk_mut(f);
                right.walk_mut(f);
            }
            Expr::Unary { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::IsEmpty { expr, .. }
            | Expr::Paren(expr) => expr.walk_mut(f),
            Expr::Function { args, .. } => args.iter_mut().for_each(|a| a.walk_mut(f)),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                if let Some(op) = operand {
                    op.walk_mut(f);
                }
                for (when, then) in when_clauses {
                    when.walk_mut(f);
                    then.walk_mut(f);
                }
                if let Some(e) = else_clause {
                    e.walk_mut(f);
                }
            }
            Expr::In { expr, values, .. } => {
                expr.walk_mut(f);
                values.iter_mut().for_each(|v| v.walk_mut(f));
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.walk_mut(f);
                low.walk_mut(f);
                high.walk_mut(f);
            }
            Expr::MemberOf {
                element,
                collection,
                ..
            } => {
                element.walk_mut(f);
                collection.walk_mut(f);
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                expr.walk_mut(f);
                pattern.walk_mut(f);
                if let Some(e) = escape {
                    e.walk_mut(f);
                }
            }
            Expr::Window {
                function,
                partition_by,
                order_by,
            } => {
                function.walk_mut(f);
                partition_by.iter_mut().for_each(|p| p.walk_mut(f));
                order_by.iter_mut().for_each(|o| o.expr.walk_mut(f));
            }
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
                subquery.select.iter_mut().for_each(|s| s.walk_mut(f));
                if let Some(w) = &mut subquery.where_clause {
                    w.walk_mut(f);
                }
            }
            Expr::RowComparison { left, right, .. } => {
                left.iter_mut().for_each(|l| l.walk_mut(f));
                right.iter_mut().for_each(|r| r.walk_mut(f));
            }
        }
    }

    /// Every join node the expression needs, including the parents of
    /// correlated subquery roots.
    pub fn referenced_joins(&self, graph: &JoinGraph) -> BTreeSet<JoinId> {
        let mut out = BTreeSet::new();
        self.walk(&mut |e| match e {
            Expr::Attribute(attr) => {
                out.insert(attr.join);
            }
            Expr::SizeCount(size) => {
                out.insert(size.join);
                out.insert(size.owner);
            }
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
                for root in graph.roots(subquery.scope) {
                    if let Some(parent) = graph.node(root).parent {
                        out.insert(parent);
                    }
                }
            }
            _ => {}
        });
        out
    }

    /// Substitute every reference to `from` with `to`.
    pub fn replace_join(&mut self, from: JoinId, to: JoinId) {
        self.walk_mut(&mut |e| match e {
            Expr::Attribute(attr) if attr.join == from => attr.join = to,
            Expr::SizeCount(size) => {
                if size.join == from {
                    size.join = to;
                }
                if size.owner == from {
                    size.owner = to;
                }
            }
            _ => {}
        });
    }

    /// Parameter names in pre-order.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Parameter(name) = e {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream.
    pub fn to_tokens(&self, ctx: &RenderContext<'_>) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Path(path) => {
                // Never reached after resolution; kept printable for diagnostics.
                ts.push(Token::Ident(path.to_string()));
            }

            Expr::Attribute(attr) => {
                ts.append(&ctx.alias_tokens(attr.join, attr.treat.as_deref()));
                for segment in &attr.path {
                    ts.push(Token::Dot).push(Token::Ident(segment.clone()));
                }
            }

            Expr::Parameter(name) => {
                ts.push(Token::Param(name.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::Binary { left, op, right } => {
                // Handle CONCAT specially for dialects that don't support || operator
                if *op == BinaryOperator::Concat && !ctx.dialect().supports_concat_operator() {
                    ts.push(Token::FunctionName("CONCAT".into()));
                    ts.lparen();
                    ts.append(&left.to_tokens(ctx));
                    ts.comma().space();
                    ts.append(&right.to_tokens(ctx));
                    ts.rparen();
                } else {
                    append_operand(&mut ts, left, Some(*op), ctx);
                    ts.space();
                    ts.push(binary_op_to_token(*op));
                    ts.space();
                    append_operand(&mut ts, right, Some(*op), ctx);
                }
            }

            Expr::Unary { op, expr } => match op {
                UnaryOperator::Not => {
                    ts.push(Token::Not).space();
                    append_operand(&mut ts, expr, None, ctx);
                }
                UnaryOperator::Minus => {
                    ts.push(Token::Minus);
                    append_operand(&mut ts, expr, None, ctx);
                }
            },

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens(ctx));
                }
                ts.rparen();
            }

            Expr::Star => {
                ts.push(Token::Star);
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                if let Some(op) = operand {
                    ts.space().append(&op.to_tokens(ctx));
                }
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens(ctx));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens(ctx));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens(ctx));
                }
                ts.space().push(Token::End);
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid, render the constant outcome instead
                if values.is_empty() {
                    let constant = if *negated {
                        Expr::eq(Expr::int(1), Expr::int(1))
                    } else {
                        Expr::always_false()
                    };
                    ts.append(&constant.to_tokens(ctx));
                } else {
                    ts.append(&expr.to_tokens(ctx));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens(ctx));
                    }
                    ts.rparen();
                }
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                ts.append(&expr.to_tokens(ctx));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::Between).space();
                ts.append(&low.to_tokens(ctx));
                ts.space().push(Token::And).space();
                ts.append(&high.to_tokens(ctx));
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens(ctx));
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::IsEmpty { expr, negated } => {
                ts.append(&expr.to_tokens(ctx));
                ts.space().push(Token::Is).space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Empty);
            }

            Expr::MemberOf {
                element,
                collection,
                negated,
            } => {
                ts.append(&element.to_tokens(ctx));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space()
                    .push(Token::Member)
                    .space()
                    .push(Token::Of)
                    .space();
                ts.append(&collection.to_tokens(ctx));
            }

            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                ts.append(&expr.to_tokens(ctx));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space()
                    .push(Token::Like)
                    .space()
                    .append(&pattern.to_tokens(ctx));
                if let Some(esc) = escape {
                    ts.space()
                        .push(Token::Escape)
                        .space()
                        .append(&esc.to_tokens(ctx));
                }
            }

            Expr::Window {
                function,
                partition_by,
                order_by,
            } => {
                ts.append(&function.to_tokens(ctx));
                ts.space().push(Token::Over).space().lparen();

                let mut need_space = false;

                if !partition_by.is_empty() {
                    ts.push(Token::PartitionBy).space();
                    for (i, expr) in partition_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&expr.to_tokens(ctx));
                    }
                    need_space = true;
                }

                if !order_by.is_empty() {
                    if need_space {
                        ts.space();
                    }
                    ts.push(Token::OrderBy).space();
                    for (i, ob) in order_by.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&ob.expr.to_tokens(ctx));
                        if let Some(dir) = &ob.dir {
                            ts.space().push(match dir {
                                SortDir::Asc => Token::Asc,
                                SortDir::Desc => Token::Desc,
                            });
                        }
                        if let Some(nulls) = &ob.nulls {
                            ts.space().push(match nulls {
                                NullsOrder::First => Token::NullsFirst,
                                NullsOrder::Last => Token::NullsLast,
                            });
                        }
                    }
                }

                ts.rparen();
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens(ctx));
                ts.rparen();
            }

            Expr::Exists { subquery, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists).space().lparen();
                ts.append(&ctx.subquery_tokens(subquery));
                ts.rparen();
            }

            Expr::Subquery(subquery) => {
                ts.lparen();
                ts.append(&ctx.subquery_tokens(subquery));
                ts.rparen();
            }

            Expr::SizeCount(size) => {
                ts.append(&size_count_tokens(size, ctx));
            }

            Expr::RowComparison { op, left, right } => {
                let left: Vec<TokenStream> = left.iter().map(|e| e.to_tokens(ctx)).collect();
                let right: Vec<TokenStream> = right.iter().map(|e| e.to_tokens(ctx)).collect();
                ts.append(&ctx.dialect().emit_row_value_comparison(
                    binary_op_to_token(*op),
                    &left,
                    &right,
                ));
            }
        }

        ts
    }
}

/// Append an operand, wrapping it when its binding is looser than the parent.
fn append_operand(
    ts: &mut TokenStream,
    operand: &Expr,
    parent: Option<BinaryOperator>,
    ctx: &RenderContext<'_>,
) {
    let wrap = match (parent, operand) {
        (Some(BinaryOperator::And), Expr::Binary { op, .. }) => *op == BinaryOperator::Or,
        (Some(p), Expr::Binary { op, .. }) if !p.is_logical() => op.is_logical(),
        (None, Expr::Binary { op, .. }) => op.is_logical() || op.is_comparison(),
        _ => false,
    };
    if wrap {
        ts.lparen().append(&operand.to_tokens(ctx)).rparen();
    } else {
        ts.append(&operand.to_tokens(ctx));
    }
}

fn size_count_tokens(size: &SizeCount, ctx: &RenderContext<'_>) -> TokenStream {
    let alias = ctx.alias(size.join).to_string();
    let mut counted = TokenStream::new();
    match &size.identity {
        SizeIdentity::Key | SizeIdentity::Index => {
            let name = if size.identity == SizeIdentity::Key {
                "KEY"
            } else {
                "INDEX"
            };
            counted
                .push(Token::FunctionName(name.into()))
                .lparen()
                .push(Token::Ident(alias))
                .rparen();
        }
        SizeIdentity::Id(id) => {
            counted
                .push(Token::Ident(alias))
                .push(Token::Dot)
                .push(Token::Ident(id.clone()));
        }
        SizeIdentity::Value => {
            counted.push(Token::Ident(alias));
        }
    }

    let distinct = ctx.size_needs_distinct(size.join);
    let mut ts = TokenStream::new();
    if ctx.capabilities().supports_count_tuple {
        ts.push(Token::FunctionName("COUNT_TUPLE".into())).lparen();
        if distinct {
            ts.push(Token::LitString("DISTINCT".into())).comma().space();
        }
    } else {
        ts.push(Token::FunctionName("COUNT".into())).lparen();
        if distinct {
            ts.push(Token::Distinct).space();
        }
    }
    ts.append(&counted).rparen();
    ts
}

pub(crate) fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Concat => Token::Concat,
    }
}

// =============================================================================
// Canonical Text
// =============================================================================

/// Canonical text of an unresolved expression. Used for join keys and alias
/// derivation, so it must not depend on rendering state.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => write!(f, "{}", path),
            Expr::Attribute(attr) => {
                match &attr.treat {
                    Some(treat) => write!(f, "TREAT(#{} AS {})", attr.join.0, treat)?,
                    None => write!(f, "#{}", attr.join.0)?,
                }
                for segment in &attr.path {
                    write!(f, ".{}", segment)?;
                }
                Ok(())
            }
            Expr::Parameter(name) => write!(f, ":{}", name),
            Expr::Literal(lit) => match lit {
                Literal::Int(n) => write!(f, "{}", n),
                Literal::Float(x) => write!(f, "{}", ryu::Buffer::new().format(*x)),
                Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
                Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
                Literal::Null => write!(f, "NULL"),
            },
            Expr::Binary { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::Unary { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT {}", expr),
                UnaryOperator::Minus => write!(f, "-{}", expr),
            },
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                write!(f, "{}(", name.to_uppercase())?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Star => write!(f, "*"),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {}", op)?;
                }
                for (when, then) in when_clauses {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(e) = else_clause {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::In {
                expr,
                values,
                negated,
            } => {
                write!(f, "{}{} IN (", expr, if *negated { " NOT" } else { "" })?;
                write_list(f, values)?;
                write!(f, ")")
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{}{} BETWEEN {} AND {}",
                expr,
                if *negated { " NOT" } else { "" },
                low,
                high
            ),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::IsEmpty { expr, negated } => {
                write!(f, "{} IS {}EMPTY", expr, if *negated { "NOT " } else { "" })
            }
            Expr::MemberOf {
                element,
                collection,
                negated,
            } => write!(
                f,
                "{}{} MEMBER OF {}",
                element,
                if *negated { " NOT" } else { "" },
                collection
            ),
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                write!(
                    f,
                    "{}{} LIKE {}",
                    expr,
                    if *negated { " NOT" } else { "" },
                    pattern
                )?;
                if let Some(e) = escape {
                    write!(f, " ESCAPE {}", e)?;
                }
                Ok(())
            }
            Expr::Window {
                function,
                partition_by,
                order_by,
            } => {
                write!(f, "{} OVER (", function)?;
                if !partition_by.is_empty() {
                    write!(f, "PARTITION BY ")?;
                    write_list(f, partition_by)?;
                }
                if !order_by.is_empty() {
                    if !partition_by.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "ORDER BY ")?;
                    for (i, ob) in order_by.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", ob.expr)?;
                        match ob.dir {
                            Some(SortDir::Asc) => write!(f, " ASC")?,
                            Some(SortDir::Desc) => write!(f, " DESC")?,
                            None => {}
                        }
                        match ob.nulls {
                            Some(NullsOrder::First) => write!(f, " NULLS FIRST")?,
                            Some(NullsOrder::Last) => write!(f, " NULLS LAST")?,
                            None => {}
                        }
                    }
                }
                write!(f, ")")
            }
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Exists { negated, subquery } => write!(
                f,
                "{}EXISTS(#scope{})",
                if *negated { "NOT " } else { "" },
                subquery.scope.0
            ),
            Expr::Subquery(subquery) => write!(f, "(#scope{})", subquery.scope.0),
            Expr::SizeCount(size) => write!(f, "SIZE(#{})", size.join.0),
            Expr::RowComparison { op, left, right } => {
                write!(f, "(")?;
                write_list(f, left)?;
                write!(f, ") {} (", op.symbol())?;
                write_list(f, right)?;
                write!(f, ")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
