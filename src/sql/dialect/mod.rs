//! Query dialect definitions and rendering capabilities.
//!
//! This module provides a trait-based abstraction for the differences
//! between target query languages. Each dialect implements `SqlDialect`
//! and advertises the capabilities the renderer and keyset synthesizer
//! consult:
//!
//! - Pagination: `LIMIT n OFFSET m` vs `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
//! - Boolean literals: true/false vs 1/0
//! - Entity joins and the correlated EXISTS fallback
//! - Row-value comparison for keyset predicates
//! - Native `NULLS FIRST`/`NULLS LAST` vs CASE emulation
//! - `COUNT_TUPLE` distinct counts
//! - `RETURNING` inside a CTE body
//!
//! # Usage
//!
//! ```ignore
//! use criteria::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! assert!(dialect.supports_row_value_comparison());
//! ```
//!
//! # Capability Matrix
//!
//! | Capability | H2 | PostgreSQL | MySQL | SQL Server | DuckDB |
//! |------------|----|-----------|-------|------------|--------|
//! | Entity join | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | Row-value comparison | ✓ | ✓ | ✓ | ❌ | ✓ |
//! | COUNT_TUPLE | ✓ | ✓ | ❌ | ❌ | ❌ |
//! | NULLS FIRST/LAST | ✓ | ✓ | ❌ | ❌ | ✓ |
//! | CTE RETURNING | ❌ | ✓ | ❌ | ❌ | ❌ |
//! | OFFSET FETCH | ❌ | ❌ | ❌ | ✓ | ❌ |
//! | Window functions | ✓ | ✓ | ✓ | ✓ | ✓ |
//!
//! Capabilities can be overridden per query through
//! [`crate::config::Capabilities`].

mod duckdb;
mod h2;
pub mod helpers;
mod mysql;
mod postgres;
mod tsql;

pub use duckdb::DuckDb;
pub use h2::H2;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use tsql::TSql;

use serde::{Deserialize, Serialize};

use super::token::{Token, TokenStream};

/// Pagination syntax variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

impl LimitStyle {
    /// Emit the pagination clause in this style.
    pub fn emit(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        match self {
            LimitStyle::LimitOffset => helpers::emit_limit_offset_standard(limit, offset),
            LimitStyle::OffsetFetch => helpers::emit_limit_offset_fetch(limit, offset),
        }
    }
}

/// Dialect trait - defines how query constructs are rendered.
///
/// The default implementations follow the JPQL/HQL surface where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Literals
    // =========================================================================

    /// Format a boolean literal.
    ///
    /// - H2/PostgreSQL/DuckDB: `true`/`false`
    /// - MySQL/T-SQL: `1`/`0`
    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Which pagination syntax this dialect uses.
    fn limit_style(&self) -> LimitStyle {
        LimitStyle::LimitOffset
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// Whether this dialect supports the `||` concat operator.
    ///
    /// MySQL uses `||` as logical OR by default.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    /// Whether this dialect supports `(a, b) > (c, d)`.
    fn supports_row_value_comparison(&self) -> bool {
        true
    }

    /// Emit a row-value comparison. Both sides must have the same arity.
    fn emit_row_value_comparison(
        &self,
        op: Token,
        left: &[TokenStream],
        right: &[TokenStream],
    ) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.lparen()
            .append_comma_separated(left)
            .rparen()
            .space()
            .push(op)
            .space()
            .lparen()
            .append_comma_separated(right)
            .rparen();
        ts
    }

    // =========================================================================
    // CTE (Common Table Expressions)
    // =========================================================================

    /// Whether to emit RECURSIVE keyword for recursive CTEs.
    ///
    /// T-SQL omits the RECURSIVE keyword.
    fn emit_recursive_keyword(&self) -> bool {
        true
    }

    /// Whether a DML statement with `RETURNING` may be a CTE body.
    fn supports_cte_returning(&self) -> bool {
        false
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Whether ad-hoc entity joins (`JOIN Person p ON ...`) are available.
    ///
    /// The correlated EXISTS fallback for cyclic ON clauses relies on this.
    fn supports_entity_join(&self) -> bool {
        true
    }

    // =========================================================================
    // NULLS Ordering
    // =========================================================================

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    ///
    /// When false the renderer emulates it with a CASE sort key.
    fn null_precedence_native(&self) -> bool {
        true
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Whether `COUNT_TUPLE(...)` is available for multi-column distinct counts.
    fn supports_count_tuple(&self) -> bool {
        false
    }

    /// Whether `fn(...) OVER (...)` is available.
    fn supports_window_functions(&self) -> bool {
        true
    }
}

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    H2,
    Postgres,
    MySql,
    TSql,
    DuckDb,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::H2 => &H2,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::TSql => &TSql,
            Dialect::DuckDb => &DuckDb,
        }
    }

    /// Look up a dialect by its configuration name.
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.to_ascii_lowercase().as_str() {
            "h2" => Some(Dialect::H2),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" => Some(Dialect::MySql),
            "tsql" | "mssql" | "sqlserver" => Some(Dialect::TSql),
            "duckdb" => Some(Dialect::DuckDb),
            _ => None,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn limit_style(&self) -> LimitStyle {
        self.dialect().limit_style()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn supports_row_value_comparison(&self) -> bool {
        self.dialect().supports_row_value_comparison()
    }

    fn emit_row_value_comparison(
        &self,
        op: Token,
        left: &[TokenStream],
        right: &[TokenStream],
    ) -> TokenStream {
        self.dialect().emit_row_value_comparison(op, left, right)
    }

    fn emit_recursive_keyword(&self) -> bool {
        self.dialect().emit_recursive_keyword()
    }

    fn supports_cte_returning(&self) -> bool {
        self.dialect().supports_cte_returning()
    }

    fn supports_entity_join(&self) -> bool {
        self.dialect().supports_entity_join()
    }

    fn null_precedence_native(&self) -> bool {
        self.dialect().null_precedence_native()
    }

    fn supports_count_tuple(&self) -> bool {
        self.dialect().supports_count_tuple()
    }

    fn supports_window_functions(&self) -> bool {
        self.dialect().supports_window_functions()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
