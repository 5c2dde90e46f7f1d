//! H2 dialect.
//!
//! H2 is the default target:
//! - Native boolean type (true/false)
//! - LIMIT ... OFFSET ... for pagination
//! - Native NULLS FIRST/LAST
//! - Row-value comparison
//! - `COUNT_TUPLE` registered as a distinct multi-column count

use super::helpers;
use super::SqlDialect;

/// H2 dialect.
#[derive(Debug, Clone, Copy)]
pub struct H2;

impl SqlDialect for H2 {
    fn name(&self) -> &'static str {
        "h2"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default limit_style (LIMIT ... OFFSET ...)

    fn supports_count_tuple(&self) -> bool {
        true
    }
}
