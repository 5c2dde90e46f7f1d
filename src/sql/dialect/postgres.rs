//! PostgreSQL dialect.
//!
//! PostgreSQL features:
//! - Native boolean type (true/false)
//! - RETURNING clause, usable inside a CTE body
//! - Row-value comparison
//! - Native NULLS FIRST/LAST

use super::helpers;
use super::SqlDialect;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default limit_style (LIMIT ... OFFSET ...)

    fn supports_cte_returning(&self) -> bool {
        true
    }

    fn supports_count_tuple(&self) -> bool {
        true
    }
}
