//! Keyset pagination.
//!
//! A [`KeysetPage`] describes a page the caller already fetched: its
//! offset, size and the ORDER BY tuples of its first and last rows. When
//! the next request is for the same, the following or the preceding page,
//! the object query seeks past the remembered tuple instead of skipping
//! rows with OFFSET.
//!
//! Two predicate shapes exist. The nested form works everywhere and
//! handles NULL keys:
//!
//! ```text
//! (k1 > :_keysetParameter_0 OR (k1 = :_keysetParameter_0 AND k2 > :_keysetParameter_1))
//! ```
//!
//! The optimized form is a single row-value comparison, used when every
//! key and value is known to be non-null:
//!
//! ```text
//! (k1, k2) > (:_keysetParameter_0, :_keysetParameter_1)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::QueryConfig;
use crate::query::OrderItem;
use crate::sql::expr::{BinaryOperator, Expr};

/// Prefix of the parameters a keyset predicate binds.
pub const KEYSET_PARAMETER_PREFIX: &str = "_keysetParameter_";

/// The ORDER BY values of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyset(pub Vec<Value>);

impl Keyset {
    pub fn new(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A previously fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysetPage {
    pub first_result: u64,
    pub max_results: u64,
    /// Keyset of the first row.
    pub lowest: Keyset,
    /// Keyset of the last row.
    pub highest: Keyset,
}

/// Position of the requested page relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeysetMode {
    /// The same page again, starting at its first row.
    Same,
    Next,
    Previous,
}

/// One ORDER BY item as the synthesizer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
    /// Whether the key can be NULL at all.
    pub nullable: bool,
}

impl From<&OrderItem> for KeysetKey {
    fn from(item: &OrderItem) -> Self {
        Self {
            expr: item.expr.expr.clone(),
            ascending: item.ascending,
            nulls_first: item.nulls_first,
            nullable: item.expr.nullable,
        }
    }
}

impl KeysetKey {
    fn flipped(&self) -> Self {
        Self {
            ascending: !self.ascending,
            nulls_first: !self.nulls_first,
            ..self.clone()
        }
    }
}

/// The mode and reference keyset for a request, or None when offset
/// pagination must be used.
pub fn keyset_mode(
    previous: &KeysetPage,
    first_result: u64,
    max_results: u64,
    arity: usize,
) -> Option<(KeysetMode, &Keyset)> {
    if previous.max_results != max_results {
        return None;
    }
    let (mode, keyset) = if previous.first_result == first_result {
        (KeysetMode::Same, &previous.lowest)
    } else if previous.first_result.checked_add(previous.max_results) == Some(first_result) {
        (KeysetMode::Next, &previous.highest)
    } else if previous.first_result.checked_sub(previous.max_results) == Some(first_result) {
        (KeysetMode::Previous, &previous.lowest)
    } else {
        return None;
    };
    (keyset.len() == arity).then_some((mode, keyset))
}

/// A keyset predicate and the values of its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetPredicate {
    pub predicate: Expr,
    pub bindings: Vec<(String, Value)>,
}

fn parameter(index: usize) -> Expr {
    Expr::param(format!("{}{}", KEYSET_PARAMETER_PREFIX, index))
}

/// Build the predicate seeking past `keyset` in `mode`.
///
/// `keys` and `keyset` must have the same arity; [`keyset_mode`] checks it.
pub fn keyset_predicate(keys: &[KeysetKey], keyset: &Keyset, mode: KeysetMode, config: &QueryConfig) -> KeysetPredicate {
    let keys: Vec<KeysetKey> = match mode {
        KeysetMode::Previous => keys.iter().map(KeysetKey::flipped).collect(),
        KeysetMode::Same | KeysetMode::Next => keys.to_vec(),
    };
    let values = &keyset.0;
    let inclusive = mode == KeysetMode::Same;
    let bindings = values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, v)| (format!("{}{}", KEYSET_PARAMETER_PREFIX, i), v.clone()))
        .collect();

    let optimized = config.optimized_keyset
        && config.capabilities.supports_row_value_comparison
        && keys.len() > 1
        && keys.iter().all(|k| !k.nullable)
        && values.iter().all(|v| !v.is_null());

    let predicate = if optimized {
        row_value_predicate(&keys, inclusive)
    } else {
        nested_predicate(&keys, values, 0, inclusive)
    };
    log::debug!(
        "{} keyset predicate over {} keys",
        if optimized { "row-value" } else { "nested" },
        keys.len()
    );
    KeysetPredicate { predicate, bindings }
}

fn row_value_predicate(keys: &[KeysetKey], inclusive: bool) -> Expr {
    let mut left = Vec::with_capacity(keys.len());
    let mut right = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        if key.ascending {
            left.push(key.expr.clone());
            right.push(parameter(i));
        } else {
            left.push(parameter(i));
            right.push(key.expr.clone());
        }
    }
    Expr::RowComparison {
        op: if inclusive {
            BinaryOperator::Gte
        } else {
            BinaryOperator::Gt
        },
        left,
        right,
    }
}

/// The predicate for keys `index..`, comparing inclusively on the last
/// key in `Same` mode.
fn nested_predicate(keys: &[KeysetKey], values: &[Value], index: usize, inclusive: bool) -> Expr {
    let key = &keys[index];
    let k = key.expr.clone();
    let last = index + 1 == keys.len();
    let rest = (!last).then(|| nested_predicate(keys, values, index + 1, inclusive));

    if values[index].is_null() {
        return match (key.nulls_first, rest) {
            (true, Some(rest)) => Expr::paren(Expr::or(
                Expr::is_null(k.clone(), true),
                Expr::paren(Expr::and(Expr::is_null(k, false), rest)),
            )),
            (false, Some(rest)) => Expr::paren(Expr::and(Expr::is_null(k, false), rest)),
            (true, None) if inclusive => Expr::paren(Expr::or(
                Expr::is_null(k.clone(), true),
                Expr::is_null(k, false),
            )),
            (true, None) => Expr::is_null(k, true),
            (false, None) if inclusive => Expr::is_null(k, false),
            (false, None) => Expr::always_false(),
        };
    }

    let op = match (key.ascending, last && inclusive) {
        (true, false) => BinaryOperator::Gt,
        (true, true) => BinaryOperator::Gte,
        (false, false) => BinaryOperator::Lt,
        (false, true) => BinaryOperator::Lte,
    };
    let compare = Expr::binary(k.clone(), op, parameter(index));
    let after = if key.nullable && !key.nulls_first {
        Expr::paren(Expr::or(compare, Expr::is_null(k.clone(), false)))
    } else {
        compare
    };
    match rest {
        None => after,
        Some(rest) => Expr::paren(Expr::or(
            after,
            Expr::paren(Expr::and(Expr::eq(k, parameter(index)), rest)),
        )),
    }
}
