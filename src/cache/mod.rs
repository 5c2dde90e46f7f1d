//! Content hashing for statement cache keys.
//!
//! A rendered [`Statement`](crate::render::Statement) is keyed by the
//! SHA-256 of its JSON form, so two builders producing the same text and
//! the same bound values share one key.

mod hash;
pub use hash::compute_hash;
