//! # criteria
//!
//! A fluent query builder over an entity metamodel. Queries are written
//! against attribute paths (`d.owner.name`, `d.contacts[1].name`); the
//! builder turns every path into joins, reuses and promotes them, and
//! renders the result as query text with named parameters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │     CriteriaBuilder (from / select / where / join ...)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [path parser]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  PathExpr (unresolved)                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolver + metamodel]
//! ┌─────────────────────────────────────────────────────────┐
//! │          JoinGraph + resolved Expr (QueryModel)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [renderer + keyset synthesizer]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Statement (text + ordered bound parameters)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use criteria::prelude::*;
//!
//! let metamodel = StaticMetamodel::from_file("model.toml")?;
//! let mut cb = CriteriaBuilder::new(&metamodel, QueryConfig::default());
//! cb.from("Document", "d")?
//!     .select("d.owner.name")?
//!     .where_("d.age")?
//!     .gt(18)?;
//! let statement = cb.statement()?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod join;
pub mod keyset;
pub mod metadata;
pub mod path;
pub mod query;
pub mod render;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{QueryConfig, Settings};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::join::JoinType;
    pub use crate::keyset::{Keyset, KeysetMode, KeysetPage};
    pub use crate::metadata::{Metamodel, StaticMetamodel};
    pub use crate::query::CriteriaBuilder;
    pub use crate::render::{PaginatedStatements, Statement};
    pub use crate::sql::dialect::Dialect;
}

pub use error::{QueryError, QueryResult};
pub use query::CriteriaBuilder;
