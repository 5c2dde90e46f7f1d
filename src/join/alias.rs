//! Deterministic alias allocation.
//!
//! Aliases are allocated in first-use order. Generated aliases always carry
//! a numeric postfix starting at `_1`; the first free number wins, so two
//! fresh builds issuing the same calls get the same aliases.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static NON_IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_*[^A-Za-z0-9_]+_*").unwrap());

/// Turn arbitrary text into an identifier fragment.
///
/// `:age` → `age`, `d.idx` → `d_idx`, `contacts_:age` → `contacts_age`.
pub fn sanitize(text: &str) -> String {
    let replaced = NON_IDENT.replace_all(text, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lower-case the first character: `Person` → `person`.
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Set of aliases in use within one query, subqueries included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasManager {
    used: BTreeSet<String>,
}

impl AliasManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `base_1`, `base_2`, ... whichever is free first.
    pub fn generate(&mut self, base: &str) -> String {
        let base = sanitize(base);
        let mut n = 1usize;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                log::trace!("allocated alias {}", candidate);
                return candidate;
            }
            n += 1;
        }
    }

    /// Allocate `base` itself when free, else behave like [`generate`](Self::generate).
    pub fn generate_plain(&mut self, base: &str) -> String {
        let base = sanitize(base);
        if self.used.insert(base.clone()) {
            return base;
        }
        self.generate(&base)
    }

    /// Claim a caller-chosen alias. Returns false when it is taken.
    pub fn register(&mut self, alias: &str) -> bool {
        self.used.insert(alias.to_string())
    }

    pub fn release(&mut self, alias: &str) {
        self.used.remove(alias);
    }

    pub fn is_used(&self, alias: &str) -> bool {
        self.used.contains(alias)
    }
}
