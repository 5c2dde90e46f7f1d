//! Join graph, alias allocation and join ordering.
//!
//! Every path a builder resolves lands here as a chain of [`JoinNode`]s.
//! Nodes are keyed canonically by `(parent, relation, index signature,
//! treat type)`, so equivalent paths share one join. The renderer later
//! walks the graph through [`join_order`].

pub mod alias;
pub mod graph;
pub mod order;

pub use alias::{decapitalize, sanitize, AliasManager};
pub use graph::{Checkpoint, JoinGraph, JoinId, JoinKey, JoinNode, JoinOrigin, JoinType, ScopeId};
pub use order::join_order;
