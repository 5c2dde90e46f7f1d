//! Fluent query builders.
//!
//! A [`CriteriaBuilder`] owns one [`QueryModel`]. Every call parses its
//! expression strings, resolves them against the metamodel (creating joins
//! in the model's [`JoinGraph`](crate::join::JoinGraph)) and stores the
//! resolved trees. Rendering is a pure read of the model.
//!
//! Sub-builders (restrictions, CASE WHEN, ON clauses, subqueries, CTEs) are
//! finite-state machines. Each registers itself on the [`BuilderStack`] of
//! the statement while it is open; any structural call on an enclosing
//! builder fails with [`QueryError::BuilderChaining`] until the sub-builder
//! reaches its terminal call.

pub mod builder;
pub mod cte;
pub mod model;
pub mod resolve;
pub mod restriction;

pub use builder::{CriteriaBuilder, OnBuilder, SubqueryBuilder};
pub use cte::CteBuilder;
pub use model::{
    CteDefinition, InsertTarget, OrderItem, Parameters, QueryModel, ResolvedExpression, SelectItem,
    SetClause, StatementKind,
};
pub use resolve::{Clause, ResolveMode, Resolver};
pub use restriction::{CaseWhenBuilder, RestrictionBuilder};

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::path;
use crate::sql::expr::Expr;

/// Lifecycle of a sub-builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Accepting calls.
    Open,
    /// Started a two-part construct that needs its closing call.
    AwaitingTerminal,
    /// Finished; further calls are rejected.
    Closed,
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderState::Open => write!(f, "open"),
            BuilderState::AwaitingTerminal => write!(f, "awaiting a terminal call"),
            BuilderState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenBuilder {
    builder: &'static str,
    state: BuilderState,
}

/// Stack of the sub-builders currently open on a statement.
#[derive(Debug, Clone, Default)]
pub struct BuilderStack {
    open: Vec<OpenBuilder>,
}

impl BuilderStack {
    /// Fail when any sub-builder is still open.
    pub fn ensure_idle(&self, action: &'static str) -> QueryResult<()> {
        match self.open.last() {
            Some(top) => Err(QueryError::BuilderChaining {
                builder: top.builder,
                state: top.state,
                action,
            }),
            None => Ok(()),
        }
    }

    /// Register a new sub-builder and return its depth.
    pub fn push(&mut self, builder: &'static str) -> usize {
        self.open.push(OpenBuilder {
            builder,
            state: BuilderState::Open,
        });
        self.open.len() - 1
    }

    /// Fail unless the sub-builder at `depth` is on top and in `expected`.
    pub fn ensure(
        &self,
        depth: usize,
        builder: &'static str,
        expected: BuilderState,
        action: &'static str,
    ) -> QueryResult<()> {
        let current = self.open.get(depth).copied().unwrap_or(OpenBuilder {
            builder,
            state: BuilderState::Closed,
        });
        if let Some(top) = self.open.last() {
            if self.open.len() > depth + 1 {
                return Err(QueryError::BuilderChaining {
                    builder: top.builder,
                    state: top.state,
                    action,
                });
            }
        }
        if current.state != expected {
            return Err(QueryError::BuilderChaining {
                builder: current.builder,
                state: current.state,
                action,
            });
        }
        Ok(())
    }

    /// Fail unless the sub-builder at `depth` is on top and not closed.
    pub fn ensure_active(&self, depth: usize, builder: &'static str, action: &'static str) -> QueryResult<()> {
        match self.state(depth) {
            BuilderState::Closed => self.ensure(depth, builder, BuilderState::Open, action),
            state => self.ensure(depth, builder, state, action),
        }
    }

    pub fn state(&self, depth: usize) -> BuilderState {
        self.open
            .get(depth)
            .map(|entry| entry.state)
            .unwrap_or(BuilderState::Closed)
    }

    pub fn set_state(&mut self, depth: usize, state: BuilderState) {
        if let Some(entry) = self.open.get_mut(depth) {
            entry.state = state;
        }
    }

    /// Close the sub-builder at `depth`.
    pub fn close(&mut self, depth: usize) {
        self.open.truncate(depth);
    }

    pub fn is_idle(&self) -> bool {
        self.open.is_empty()
    }
}

/// Per-statement state shared by a builder and its sub-builders.
#[derive(Debug, Clone, Default)]
pub struct Session {
    parse_cache: HashMap<String, Expr>,
    pub params: Parameters,
    pub builders: BuilderStack,
}

impl Session {
    /// Parse an expression, reusing an earlier parse of the same text.
    pub fn parse(&mut self, text: &str) -> QueryResult<Expr> {
        if let Some(expr) = self.parse_cache.get(text) {
            return Ok(expr.clone());
        }
        let expr = path::parse(text)?;
        self.parse_cache.insert(text.to_string(), expr.clone());
        Ok(expr)
    }

    /// Bind a value to a fresh `param_<n>` parameter.
    pub fn bind(&mut self, value: Value) -> Expr {
        Expr::Parameter(self.params.bind(value))
    }
}

/// A builder that accepts predicates from a [`RestrictionBuilder`].
pub trait PredicateSink {
    fn session(&mut self) -> &mut Session;

    /// Take a finished, unresolved predicate.
    fn accept(&mut self, clause: Clause, predicate: Expr) -> QueryResult<()>;
}
