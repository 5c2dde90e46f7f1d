//! Expression tree, tokens and dialects of the generated query language.
//!
//! - [`expr`] - resolved expression tree and its rendering
//! - [`token`] - token stream the renderer emits into
//! - [`dialect`] - dialect capabilities and syntax variants

pub mod dialect;
pub mod expr;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{BinaryOperator, Expr};
pub use token::{Token, TokenStream};
