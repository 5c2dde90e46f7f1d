//! DuckDB dialect.
//!
//! DuckDB is PostgreSQL-compatible for everything the renderer emits,
//! except that it has no `COUNT_TUPLE` registration and no CTE `RETURNING`.

use super::helpers;
use super::SqlDialect;

/// DuckDB dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default limit_style (LIMIT ... OFFSET ...)
}
