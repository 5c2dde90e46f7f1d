//! Error taxonomy for query construction and rendering.
//!
//! Every error is a deterministic function of the model state and the
//! offending call. Nothing is retried; errors surface at the builder call
//! (parse/resolve/join) or at render time (dialect capability gaps).

use std::ops::Range;

use thiserror::Error;

use crate::query::BuilderState;

/// Byte range inside a parsed expression string.
pub type Span = Range<usize>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// Malformed path or expression text.
    #[error("Syntax error at {span:?}: {message}")]
    Syntax { message: String, span: Span },

    /// The metamodel has no attribute with this name on the owner type.
    #[error("Unknown attribute '{attribute}' on type '{owner}'")]
    UnknownAttribute { owner: String, attribute: String },

    /// A bare identifier could resolve against more than one root.
    #[error("Ambiguous root for '{identifier}', candidates: {}", candidates.join(", "))]
    AmbiguousRoot {
        identifier: String,
        candidates: Vec<String>,
    },

    /// An explicit join conflicts with an existing join or alias.
    #[error("Illegal join override for alias '{alias}': {reason}")]
    IllegalJoinOverride { alias: String, reason: String },

    /// A sub-builder was used out of order or left unterminated.
    #[error("Cannot {action} on {builder} while it is {state}")]
    BuilderChaining {
        builder: &'static str,
        state: BuilderState,
        action: &'static str,
    },

    /// The configured dialect lacks a capability the query needs.
    #[error("Unsupported operation for dialect {dialect}: {operation}")]
    UnsupportedOperation { operation: String, dialect: String },

    #[error("Unknown alias '{0}'")]
    UnknownAlias(String),

    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        QueryError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn unknown_attribute(owner: &str, attribute: &str) -> Self {
        QueryError::UnknownAttribute {
            owner: owner.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, dialect: impl std::fmt::Display) -> Self {
        QueryError::UnsupportedOperation {
            operation: operation.into(),
            dialect: dialect.to_string(),
        }
    }

    pub fn illegal_override(alias: &str, reason: impl Into<String>) -> Self {
        QueryError::IllegalJoinOverride {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }
}
