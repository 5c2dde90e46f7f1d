//! Attribute path AST.
//!
//! A path is an ordered list of segments. Each segment may carry an index
//! accessor (`[...]`) and a treat cast (`TREAT(... AS Type)`) applying to the
//! value the segment denotes.

use std::fmt;

use crate::sql::expr::Expr;

/// Reserved name of the element alias inside index predicates.
pub const ELEMENT_ALIAS: &str = "_";

/// A dotted attribute path such as `d.contacts[:age].name`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub segments: Vec<PathSegment>,
}

/// One identifier of a path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<IndexAccessor>,
    /// Subtype the segment value is narrowed to.
    pub treat: Option<String>,
}

/// Bracketed accessor on a plural segment.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexAccessor {
    /// `[1]`, `[:age]`, `[d.idx]`: a key or index value.
    Value(Expr),
    /// `[KEY(_) = 'x']`, `[_.name = :n]`: boolean predicate over the element alias.
    Predicate(Expr),
}

impl PathExpr {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Build an index-free path from dotted text. Does not validate.
    pub fn from_dotted(text: &str) -> Self {
        Self {
            segments: text.split('.').map(PathSegment::plain).collect(),
        }
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// Whether this path starts at the element alias `_`.
    pub fn is_element_rooted(&self) -> bool {
        self.first().is_some_and(|s| s.name == ELEMENT_ALIAS)
    }

    /// Expressions nested in index accessors.
    pub fn index_exprs(&self) -> Vec<&Expr> {
        self.segments
            .iter()
            .filter_map(|s| s.index.as_ref())
            .map(|idx| match idx {
                IndexAccessor::Value(e) | IndexAccessor::Predicate(e) => e,
            })
            .collect()
    }
}

impl PathSegment {
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: None,
            treat: None,
        }
    }
}

impl IndexAccessor {
    /// The accessor as a predicate over `_`: a value `v` becomes `KEY(_) = v`.
    ///
    /// The resolver rewrites `KEY` to `INDEX` for list attributes.
    pub fn normalized_predicate(&self) -> Expr {
        match self {
            IndexAccessor::Value(value) => Expr::eq(
                Expr::function("KEY", vec![Expr::Path(PathExpr::from_dotted(ELEMENT_ALIAS))]),
                value.clone(),
            ),
            IndexAccessor::Predicate(predicate) => predicate.clone(),
        }
    }

    /// Canonical text of the normalized predicate, part of the join key.
    pub fn signature(&self) -> String {
        self.normalized_predicate().to_string()
    }

    /// The keyed value when the accessor is, or normalizes to, `KEY(_) = v`.
    pub fn keyed_value(&self) -> Option<&Expr> {
        match self {
            IndexAccessor::Value(value) => Some(value),
            IndexAccessor::Predicate(Expr::Binary { left, op, right })
                if *op == crate::sql::expr::BinaryOperator::Eq =>
            {
                match left.as_ref() {
                    Expr::Function { name, args, .. }
                        if (name.eq_ignore_ascii_case("KEY")
                            || name.eq_ignore_ascii_case("INDEX"))
                            && args.len() == 1
                            && matches!(&args[0], Expr::Path(p) if p.segments.len() == 1 && p.is_element_rooted()) =>
                    {
                        Some(right.as_ref())
                    }
                    _ => None,
                }
            }
            IndexAccessor::Predicate(_) => None,
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // TREAT wraps the path prefix ending at the treated segment.
        let mut text = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                text.push('.');
            }
            text.push_str(&segment.name);
            if let Some(index) = &segment.index {
                let inner = match index {
                    IndexAccessor::Value(e) | IndexAccessor::Predicate(e) => e.to_string(),
                };
                text.push('[');
                text.push_str(&inner);
                text.push(']');
            }
            if let Some(treat) = &segment.treat {
                text = format!("TREAT({} AS {})", text, treat);
            }
        }
        write!(f, "{}", text)
    }
}
