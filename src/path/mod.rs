//! Path expression language.
//!
//! Expressions passed to the builders as strings (`d.owner.name`,
//! `d.contacts[:age].name`, `SIZE(d.people) > 1`) are lexed and parsed
//! here into [`Expr`](crate::sql::expr::Expr) trees with unresolved
//! [`PathExpr`] leaves. Resolution against the metamodel happens in
//! [`crate::query`].

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{IndexAccessor, PathExpr, PathSegment, ELEMENT_ALIAS};
pub use parser::{parse, parse_path};
