//! Lexer for path expressions.
//!
//! Converts expression text into tokens with span information. Keywords are
//! not distinguished here: JPQL keywords are case-insensitive and many of
//! them (`key`, `value`, `index`, `size`) are also legal attribute names, so
//! the parser decides by position.

use chumsky::prelude::*;

use crate::error::{QueryError, QueryResult};

/// A token of the path expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum PathToken<'src> {
    /// An identifier or keyword.
    Ident(&'src str),
    /// An integer or decimal number.
    Number(&'src str),
    /// A string literal with `''` escapes resolved.
    StringLit(String),
    /// A named parameter without the leading colon.
    Param(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `=`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `||`
    Concat,
}

impl<'src> std::fmt::Display for PathToken<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathToken::Ident(s) => write!(f, "{}", s),
            PathToken::Number(s) => write!(f, "{}", s),
            PathToken::StringLit(s) => write!(f, "'{}'", s.replace('\'', "''")),
            PathToken::Param(s) => write!(f, ":{}", s),
            PathToken::Dot => write!(f, "."),
            PathToken::Comma => write!(f, ","),
            PathToken::LParen => write!(f, "("),
            PathToken::RParen => write!(f, ")"),
            PathToken::LBracket => write!(f, "["),
            PathToken::RBracket => write!(f, "]"),
            PathToken::Eq => write!(f, "="),
            PathToken::Ne => write!(f, "<>"),
            PathToken::Lt => write!(f, "<"),
            PathToken::Gt => write!(f, ">"),
            PathToken::Lte => write!(f, "<="),
            PathToken::Gte => write!(f, ">="),
            PathToken::Plus => write!(f, "+"),
            PathToken::Minus => write!(f, "-"),
            PathToken::Star => write!(f, "*"),
            PathToken::Slash => write!(f, "/"),
            PathToken::Concat => write!(f, "||"),
        }
    }
}

/// Create a lexer for path expressions.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(PathToken<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // Identifiers: start with letter or underscore, followed by alphanumeric or underscore
    let ident = text::ident().map(PathToken::Ident);

    // Named parameters: `:name`
    let param = just(':').ignore_then(text::ident()).map(PathToken::Param);

    // String literals: '...' with '' as the escaped quote
    let string_lit = just('\'')
        .ignore_then(
            choice((just("''").to('\''), none_of('\'')))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''))
        .map(PathToken::StringLit);

    // Numbers: integers and decimals
    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(PathToken::Number);

    // Multi-char symbols first, then single-char
    let operator = choice((
        just("<>").to(PathToken::Ne),
        just("!=").to(PathToken::Ne),
        just("<=").to(PathToken::Lte),
        just(">=").to(PathToken::Gte),
        just("||").to(PathToken::Concat),
        just('=').to(PathToken::Eq),
        just('<').to(PathToken::Lt),
        just('>').to(PathToken::Gt),
        just('+').to(PathToken::Plus),
        just('-').to(PathToken::Minus),
        just('*').to(PathToken::Star),
        just('/').to(PathToken::Slash),
    ));

    let punctuation = choice((
        just('.').to(PathToken::Dot),
        just(',').to(PathToken::Comma),
        just('(').to(PathToken::LParen),
        just(')').to(PathToken::RParen),
        just('[').to(PathToken::LBracket),
        just(']').to(PathToken::RBracket),
    ));

    // A single token with span
    let token = choice((ident, param, string_lit, number, operator, punctuation))
        .map_with(|tok, e| (tok, e.span()));

    token
        .padded()
        .repeated()
        .collect::<Vec<_>>()
        .padded()
        .then_ignore(end())
}

/// Lex an expression string into tokens.
///
/// The first lexer error is reported as a syntax error with its byte span.
pub fn lex(source: &str) -> QueryResult<Vec<(PathToken<'_>, SimpleSpan)>> {
    use chumsky::span::Span as _;

    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if let Some(err) = errs.into_iter().next() {
        let span = err.span();
        return Err(QueryError::syntax(
            err.to_string(),
            span.start()..span.end(),
        ));
    }
    Ok(tokens.unwrap_or_default())
}
