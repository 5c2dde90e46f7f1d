//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL differences:
//! - No native boolean in SELECT, rendered as 1/0
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - No RECURSIVE keyword for recursive CTEs
//! - No row-value comparison
//! - No NULLS FIRST/LAST before 2022

use super::helpers;
use super::{LimitStyle, SqlDialect};

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn limit_style(&self) -> LimitStyle {
        LimitStyle::OffsetFetch
    }

    fn supports_row_value_comparison(&self) -> bool {
        false
    }

    fn emit_recursive_keyword(&self) -> bool {
        // T-SQL doesn't use RECURSIVE keyword
        false
    }

    fn null_precedence_native(&self) -> bool {
        // T-SQL 2022+ supports NULLS FIRST/LAST, but older versions don't
        false
    }
}
