//! Recursive-descent parser for path expressions.
//!
//! Precedence, loosest first: `OR`, `AND`, `NOT`, predicates (comparison,
//! `IS`, `IN`, `BETWEEN`, `LIKE`, `MEMBER OF`), additive (`+ - ||`),
//! multiplicative (`* /`), unary minus, primaries.

use chumsky::span::SimpleSpan;

use super::ast::{IndexAccessor, PathExpr, PathSegment, ELEMENT_ALIAS};
use super::lexer::{lex, PathToken};
use crate::error::{QueryError, QueryResult, Span};
use crate::sql::expr::{
    BinaryOperator, Expr, Literal, NullsOrder, SortDir, UnaryOperator, WindowOrderBy,
};

/// Parse an expression string into an unresolved expression tree.
pub fn parse(source: &str) -> QueryResult<Expr> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        source_len: source.len(),
        element_scope: 0,
    };
    if tokens.is_empty() {
        return Err(QueryError::syntax("empty expression", 0..0));
    }
    let expr = parser.parse_or()?;
    if let Some((tok, span)) = parser.tokens.get(parser.pos) {
        return Err(QueryError::syntax(
            format!("unexpected trailing input '{}'", tok),
            span.start..span.end,
        ));
    }
    Ok(expr)
}

/// Parse a string that must be a single attribute path.
pub fn parse_path(source: &str) -> QueryResult<PathExpr> {
    match parse(source)? {
        Expr::Path(path) => Ok(path),
        other => Err(QueryError::syntax(
            format!("expected an attribute path, found '{}'", other),
            0..source.len(),
        )),
    }
}

struct Parser<'t, 'src> {
    tokens: &'t [(PathToken<'src>, SimpleSpan)],
    pos: usize,
    source_len: usize,
    /// Depth of enclosing index accessors; `_` is only legal when positive.
    element_scope: usize,
}

impl<'t, 'src> Parser<'t, 'src> {
    // ========================================================================
    // Token helpers
    // ========================================================================

    fn peek(&self) -> Option<&PathToken<'src>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&PathToken<'src>> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.start..span.end,
            None => self.source_len..self.source_len,
        }
    }

    fn advance(&mut self) -> Option<PathToken<'src>> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, message: impl Into<String>) -> QueryResult<T> {
        Err(QueryError::syntax(message, self.span()))
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(PathToken::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.is_keyword_at(0, keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> QueryResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            self.error(format!("expected {}", keyword))
        }
    }

    fn eat(&mut self, expected: &PathToken<'_>) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &PathToken<'_>, context: &str) -> QueryResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => self.error(format!("expected '{}' {}, found '{}'", expected, context, found)),
                None => self.error(format!("expected '{}' {}, found end of input", expected, context)),
            }
        }
    }

    fn expect_ident(&mut self, context: &str) -> QueryResult<String> {
        match self.peek() {
            Some(PathToken::Ident(s)) => {
                let s = s.to_string();
                self.pos += 1;
                Ok(s)
            }
            _ => self.error(format!("expected identifier {}", context)),
        }
    }

    // ========================================================================
    // Logical operators
    // ========================================================================

    fn parse_or(&mut self) -> QueryResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> QueryResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> QueryResult<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_predicate()
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn parse_predicate(&mut self) -> QueryResult<Expr> {
        let left = self.parse_additive()?;

        let comparison = match self.peek() {
            Some(PathToken::Eq) => Some(BinaryOperator::Eq),
            Some(PathToken::Ne) => Some(BinaryOperator::Ne),
            Some(PathToken::Lt) => Some(BinaryOperator::Lt),
            Some(PathToken::Gt) => Some(BinaryOperator::Gt),
            Some(PathToken::Lte) => Some(BinaryOperator::Lte),
            Some(PathToken::Gte) => Some(BinaryOperator::Gte),
            _ => None,
        };
        if let Some(op) = comparison {
            self.pos += 1;
            let right = self.parse_additive()?;
            return Ok(Expr::binary(left, op, right));
        }

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("NULL") {
                return Ok(Expr::is_null(left, negated));
            }
            if self.eat_keyword("EMPTY") {
                return Ok(Expr::IsEmpty {
                    expr: Box::new(left),
                    negated,
                });
            }
            return self.error("expected NULL or EMPTY after IS");
        }

        let negated = if self.is_keyword("NOT")
            && ["IN", "BETWEEN", "LIKE", "MEMBER"]
                .iter()
                .any(|kw| self.is_keyword_at(1, kw))
        {
            self.pos += 1;
            true
        } else {
            false
        };

        if self.eat_keyword("IN") {
            let values = if let Some(PathToken::Param(name)) = self.peek() {
                let name = name.to_string();
                self.pos += 1;
                vec![Expr::Parameter(name)]
            } else {
                self.expect(&PathToken::LParen, "after IN")?;
                let values = self.parse_list(&PathToken::RParen)?;
                self.expect(&PathToken::RParen, "to close IN list")?;
                values
            };
            return Ok(Expr::In {
                expr: Box::new(left),
                values,
                negated,
            });
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_additive()?;
            self.expect_keyword("AND")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        if self.eat_keyword("LIKE") {
            let pattern = self.parse_additive()?;
            let escape = if self.eat_keyword("ESCAPE") {
                Some(Box::new(self.parse_primary()?))
            } else {
                None
            };
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                escape,
                negated,
            });
        }

        if self.eat_keyword("MEMBER") {
            self.eat_keyword("OF");
            let collection = self.parse_additive()?;
            return Ok(Expr::MemberOf {
                element: Box::new(left),
                collection: Box::new(collection),
                negated,
            });
        }

        if negated {
            return self.error("expected IN, BETWEEN, LIKE or MEMBER after NOT");
        }
        Ok(left)
    }

    fn parse_list(&mut self, terminator: &PathToken<'_>) -> QueryResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek() == Some(terminator) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if !self.eat(&PathToken::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn parse_additive(&mut self) -> QueryResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(PathToken::Plus) => BinaryOperator::Plus,
                Some(PathToken::Minus) => BinaryOperator::Minus,
                Some(PathToken::Concat) => BinaryOperator::Concat,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> QueryResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(PathToken::Star) => BinaryOperator::Mul,
                Some(PathToken::Slash) => BinaryOperator::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> QueryResult<Expr> {
        if self.eat(&PathToken::Minus) {
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Literal(Literal::Int(n)) => Expr::Literal(Literal::Int(-n)),
                Expr::Literal(Literal::Float(f)) => Expr::Literal(Literal::Float(-f)),
                other => Expr::Unary {
                    op: UnaryOperator::Minus,
                    expr: Box::new(other),
                },
            });
        }
        if self.eat(&PathToken::Plus) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    // ========================================================================
    // Primaries
    // ========================================================================

    fn parse_primary(&mut self) -> QueryResult<Expr> {
        let span = self.span();
        match self.peek().cloned() {
            Some(PathToken::Number(text)) => {
                self.pos += 1;
                if text.contains('.') {
                    text.parse::<f64>()
                        .map(|f| Expr::Literal(Literal::Float(f)))
                        .map_err(|e| QueryError::syntax(e.to_string(), span))
                } else {
                    text.parse::<i64>()
                        .map(Expr::int)
                        .map_err(|e| QueryError::syntax(e.to_string(), span))
                }
            }
            Some(PathToken::StringLit(s)) => {
                self.pos += 1;
                Ok(Expr::string(s))
            }
            Some(PathToken::Param(name)) => {
                self.pos += 1;
                Ok(Expr::param(name))
            }
            Some(PathToken::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(&PathToken::RParen, "to close parenthesis")?;
                Ok(Expr::paren(inner))
            }
            Some(PathToken::Ident(name)) => self.parse_identifier_primary(name),
            Some(other) => self.error(format!("unexpected '{}'", other)),
            None => self.error("unexpected end of input"),
        }
    }

    fn parse_identifier_primary(&mut self, name: &str) -> QueryResult<Expr> {
        let followed_by_paren = self.peek_at(1) == Some(&PathToken::LParen);
        let followed_by_path = matches!(
            self.peek_at(1),
            Some(PathToken::Dot) | Some(PathToken::LBracket)
        );

        if !followed_by_paren && !followed_by_path {
            let literal = match name.to_ascii_uppercase().as_str() {
                "TRUE" => Some(Literal::Bool(true)),
                "FALSE" => Some(Literal::Bool(false)),
                "NULL" => Some(Literal::Null),
                _ => None,
            };
            if let Some(lit) = literal {
                self.pos += 1;
                return Ok(Expr::Literal(lit));
            }
            if name.eq_ignore_ascii_case("CASE") {
                self.pos += 1;
                return self.parse_case();
            }
            if ["AND", "OR", "NOT", "IS", "IN", "BETWEEN", "LIKE", "THEN", "ELSE", "END", "WHEN"]
                .iter()
                .any(|kw| name.eq_ignore_ascii_case(kw))
            {
                return self.error(format!("expected expression, found keyword '{}'", name));
            }
        }

        if followed_by_paren {
            if name.eq_ignore_ascii_case("TREAT") {
                self.pos += 1;
                return self.parse_treat();
            }
            self.pos += 1;
            return self.parse_function(name);
        }

        self.parse_path()
    }

    fn parse_case(&mut self) -> QueryResult<Expr> {
        let operand = if self.is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_additive()?))
        };

        let mut when_clauses = Vec::new();
        while self.eat_keyword("WHEN") {
            let condition = self.parse_or()?;
            self.expect_keyword("THEN")?;
            let result = self.parse_or()?;
            when_clauses.push((condition, result));
        }
        if when_clauses.is_empty() {
            return self.error("CASE requires at least one WHEN clause");
        }

        let else_clause = if self.eat_keyword("ELSE") {
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };
        self.expect_keyword("END")?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_clause,
        })
    }

    fn parse_treat(&mut self) -> QueryResult<Expr> {
        self.expect(&PathToken::LParen, "after TREAT")?;
        let inner = self.parse_additive()?;
        let mut path = match inner {
            Expr::Path(path) => path,
            other => return self.error(format!("TREAT requires a path, found '{}'", other)),
        };
        self.expect_keyword("AS")?;
        let subtype = self.expect_ident("after AS")?;
        self.expect(&PathToken::RParen, "to close TREAT")?;

        match path.segments.last_mut() {
            Some(last) if last.treat.is_none() => last.treat = Some(subtype),
            _ => return self.error("nested TREAT of the same path segment"),
        }

        self.parse_path_tail(&mut path)?;
        Ok(Expr::Path(path))
    }

    fn parse_function(&mut self, name: &str) -> QueryResult<Expr> {
        self.expect(&PathToken::LParen, "after function name")?;

        let mut function_name = name.to_ascii_uppercase();
        if function_name == "FUNCTION" {
            match self.advance() {
                Some(PathToken::StringLit(s)) => function_name = s.to_ascii_uppercase(),
                _ => return self.error("FUNCTION requires a quoted function name"),
            }
            if self.peek() != Some(&PathToken::RParen) {
                self.expect(&PathToken::Comma, "after function name")?;
            }
        }

        let distinct = self.eat_keyword("DISTINCT");
        let args = if self.peek() == Some(&PathToken::Star) && self.peek_at(1) == Some(&PathToken::RParen) {
            self.pos += 1;
            vec![Expr::Star]
        } else {
            self.parse_list(&PathToken::RParen)?
        };
        self.expect(&PathToken::RParen, "to close function call")?;

        let function = Expr::Function {
            name: function_name,
            args,
            distinct,
        };

        if self.is_keyword("OVER") {
            self.pos += 1;
            return self.parse_window(function);
        }
        Ok(function)
    }

    fn parse_window(&mut self, function: Expr) -> QueryResult<Expr> {
        self.expect(&PathToken::LParen, "after OVER")?;

        let mut partition_by = Vec::new();
        if self.eat_keyword("PARTITION") {
            self.expect_keyword("BY")?;
            loop {
                partition_by.push(self.parse_additive()?);
                if !self.eat(&PathToken::Comma) {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.parse_additive()?;
                let dir = if self.eat_keyword("ASC") {
                    Some(SortDir::Asc)
                } else if self.eat_keyword("DESC") {
                    Some(SortDir::Desc)
                } else {
                    None
                };
                let nulls = if self.eat_keyword("NULLS") {
                    if self.eat_keyword("FIRST") {
                        Some(NullsOrder::First)
                    } else if self.eat_keyword("LAST") {
                        Some(NullsOrder::Last)
                    } else {
                        return self.error("expected FIRST or LAST after NULLS");
                    }
                } else {
                    None
                };
                order_by.push(WindowOrderBy { expr, dir, nulls });
                if !self.eat(&PathToken::Comma) {
                    break;
                }
            }
        }

        self.expect(&PathToken::RParen, "to close OVER clause")?;
        Ok(Expr::Window {
            function: Box::new(function),
            partition_by,
            order_by,
        })
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn parse_path(&mut self) -> QueryResult<Expr> {
        let span = self.span();
        let first = self.expect_ident("at start of path")?;
        if first == ELEMENT_ALIAS && self.element_scope == 0 {
            return Err(QueryError::syntax(
                "the element alias '_' is only allowed inside an index predicate",
                span,
            ));
        }
        let mut path = PathExpr::new(vec![PathSegment::plain(&first)]);
        self.parse_path_tail(&mut path)?;
        Ok(Expr::Path(path))
    }

    /// Parse `[index]` and `.segment` continuations onto `path`.
    fn parse_path_tail(&mut self, path: &mut PathExpr) -> QueryResult<()> {
        loop {
            if self.peek() == Some(&PathToken::LBracket) {
                let index = self.parse_index()?;
                match path.segments.last_mut() {
                    Some(last) if last.index.is_none() && last.treat.is_none() => {
                        last.index = Some(index)
                    }
                    _ => return self.error("index accessor must follow a plain attribute"),
                }
            } else if self.eat(&PathToken::Dot) {
                let name = self.expect_ident("after '.'")?;
                if name == ELEMENT_ALIAS {
                    return self.error("the element alias '_' can only start a path");
                }
                path.segments.push(PathSegment::plain(&name));
            } else {
                return Ok(());
            }
        }
    }

    fn parse_index(&mut self) -> QueryResult<IndexAccessor> {
        let open = self.span();
        self.expect(&PathToken::LBracket, "to open index")?;

        self.element_scope += 1;
        let inner = self.parse_or();
        self.element_scope -= 1;
        let inner = inner?;

        if !self.eat(&PathToken::RBracket) {
            return Err(QueryError::syntax(
                "unterminated index accessor, expected ']'",
                open.start..self.span().end,
            ));
        }

        if inner.is_predicate() {
            return Ok(IndexAccessor::Predicate(inner));
        }

        let mut uses_element = false;
        inner.walk(&mut |e| {
            if let Expr::Path(p) = e {
                if p.is_element_rooted() {
                    uses_element = true;
                }
            }
        });
        if uses_element {
            return Err(QueryError::syntax(
                "the element alias '_' is only allowed inside an index predicate",
                open,
            ));
        }
        Ok(IndexAccessor::Value(inner))
    }
}
