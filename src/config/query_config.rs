//! Per-query rendering configuration.
//!
//! A [`QueryConfig`] is passed explicitly to every builder, to the renderer
//! and to the keyset synthesizer. There is no global registry, so queries
//! targeting different dialects can be built side by side.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sql::dialect::{Dialect, LimitStyle, SqlDialect};

/// Capability flags consulted while resolving and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_entity_join: bool,
    pub supports_row_value_comparison: bool,
    pub supports_count_tuple: bool,
    pub null_precedence_native: bool,
    pub supports_cte_returning: bool,
    pub limit_style: LimitStyle,
    pub supports_window_functions: bool,
    pub emit_recursive_keyword: bool,
}

impl Capabilities {
    /// The capabilities a dialect advertises.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            supports_entity_join: dialect.supports_entity_join(),
            supports_row_value_comparison: dialect.supports_row_value_comparison(),
            supports_count_tuple: dialect.supports_count_tuple(),
            null_precedence_native: dialect.null_precedence_native(),
            supports_cte_returning: dialect.supports_cte_returning(),
            limit_style: dialect.limit_style(),
            supports_window_functions: dialect.supports_window_functions(),
            emit_recursive_keyword: dialect.emit_recursive_keyword(),
        }
    }

    /// Apply the overrides that are set.
    pub fn with_overrides(mut self, overrides: &CapabilityOverrides) -> Self {
        let apply = |slot: &mut bool, value: Option<bool>| {
            if let Some(v) = value {
                *slot = v;
            }
        };
        apply(&mut self.supports_entity_join, overrides.supports_entity_join);
        apply(
            &mut self.supports_row_value_comparison,
            overrides.supports_row_value_comparison,
        );
        apply(&mut self.supports_count_tuple, overrides.supports_count_tuple);
        apply(&mut self.null_precedence_native, overrides.null_precedence_native);
        apply(&mut self.supports_cte_returning, overrides.supports_cte_returning);
        apply(
            &mut self.supports_window_functions,
            overrides.supports_window_functions,
        );
        apply(&mut self.emit_recursive_keyword, overrides.emit_recursive_keyword);
        if let Some(style) = overrides.limit_style {
            self.limit_style = style;
        }
        self
    }
}

/// Optional capability overrides, as read from the `[capabilities]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityOverrides {
    pub supports_entity_join: Option<bool>,
    pub supports_row_value_comparison: Option<bool>,
    pub supports_count_tuple: Option<bool>,
    pub null_precedence_native: Option<bool>,
    pub supports_cte_returning: Option<bool>,
    pub limit_style: Option<LimitStyle>,
    pub supports_window_functions: Option<bool>,
    pub emit_recursive_keyword: Option<bool>,
}

/// Functions the GROUP BY inference treats as aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRegistry {
    aggregates: BTreeSet<String>,
}

const BUILTIN_AGGREGATES: &[&str] = &["AVG", "COUNT", "COUNT_TUPLE", "MAX", "MIN", "SUM"];

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self {
            aggregates: BUILTIN_AGGREGATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FunctionRegistry {
    /// Register an additional aggregate function.
    pub fn register_aggregate(&mut self, name: &str) {
        self.aggregates.insert(name.to_ascii_uppercase());
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.aggregates.contains(&name.to_ascii_uppercase())
    }
}

/// Everything a builder needs to know about its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub dialect: Dialect,
    pub capabilities: Capabilities,
    /// Render keyset predicates as row-value comparisons where possible.
    pub optimized_keyset: bool,
    /// Infer GROUP BY from aggregated select items.
    pub implicit_group_by: bool,
    /// Rewrite `SIZE(..)` in the select list into a grouped count.
    pub size_to_count: bool,
    /// Render `a.assoc.id` without joining `assoc`.
    pub id_access_without_join: bool,
    pub functions: FunctionRegistry,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::for_dialect(Dialect::default())
    }
}

impl QueryConfig {
    /// Default options with the dialect's own capabilities.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            capabilities: Capabilities::for_dialect(dialect),
            optimized_keyset: true,
            implicit_group_by: true,
            size_to_count: true,
            id_access_without_join: false,
            functions: FunctionRegistry::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}
