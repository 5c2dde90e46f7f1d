//! Join graph: the arena of join nodes shared by a query and its subqueries.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use super::alias::AliasManager;
use crate::error::{QueryError, QueryResult};
use crate::metadata::{AttributeKind, Cardinality};
use crate::sql::expr::Expr;

// =============================================================================
// Identifiers
// =============================================================================

/// Index of a node in the join graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinId(pub usize);

/// Alias scope. The main query is [`ScopeId::MAIN`]; every correlated
/// subquery gets its own scope whose parent is the enclosing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const MAIN: ScopeId = ScopeId(0);
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// How a node came into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JoinOrigin {
    /// `from(Entity, alias)`
    Root,
    /// Entity name used as the first path segment.
    ImplicitRoot,
    /// Created while resolving a path.
    #[default]
    Implicit,
    /// `join(path, alias, type)`
    Explicit,
    /// `join_on(Entity, alias, type)`
    Entity,
    /// `FROM owner.relation alias` inside a correlated subquery.
    Correlated,
    /// Re-rooted element of the correlated EXISTS fallback.
    Synthetic,
}

impl JoinOrigin {
    /// Whether the node renders as a FROM item instead of a JOIN.
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            JoinOrigin::Root | JoinOrigin::ImplicitRoot | JoinOrigin::Correlated | JoinOrigin::Synthetic
        )
    }
}

/// A join (or FROM item) of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinNode {
    pub id: JoinId,
    pub alias: String,
    pub scope: ScopeId,
    pub origin: JoinOrigin,
    pub parent: Option<JoinId>,
    /// Relation below the parent, dotted when it crosses embeddables.
    pub relation: Option<String>,
    /// Type of the joined value, the treat type when treated.
    pub entity_type: String,
    /// Entity name rendered for FROM items and entity joins.
    pub entity_name: String,
    pub cardinality: Cardinality,
    pub element_kind: AttributeKind,
    pub join_type: JoinType,
    pub on: Option<Expr>,
    pub treat: Option<String>,
    /// Subtype the parent alias is narrowed to, rendered `TREAT(parent AS T).relation`.
    pub parent_treat: Option<String>,
    /// Whether the joined value may be absent for a parent row.
    pub nullable: bool,
    /// Canonical text of the index predicate that keyed this node.
    pub index_signature: Option<String>,
}

impl JoinNode {
    pub fn is_plural(&self) -> bool {
        self.cardinality.is_plural()
    }
}

/// Canonical identity of an implicit or explicit join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    pub parent: JoinId,
    pub relation: String,
    pub index: Option<String>,
    pub treat: Option<String>,
    pub parent_treat: Option<String>,
    /// Dedicated join counting a collection for a size transformation.
    pub size: bool,
}

impl JoinKey {
    pub fn new(parent: JoinId, relation: impl Into<String>) -> Self {
        Self {
            parent,
            relation: relation.into(),
            index: None,
            treat: None,
            parent_treat: None,
            size: false,
        }
    }
}

/// Graph state saved before speculative resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    nodes: usize,
    scopes: usize,
}

// =============================================================================
// Graph
// =============================================================================

/// Arena of join nodes plus the canonical key index used for join reuse.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    nodes: Vec<JoinNode>,
    keys: HashMap<JoinKey, JoinId>,
    aliases: AliasManager,
    /// Parent of each scope; `None` for the main scope.
    scopes: Vec<Option<ScopeId>>,
}

impl Default for JoinGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            keys: HashMap::new(),
            aliases: AliasManager::new(),
            scopes: vec![None],
        }
    }

    pub fn node(&self, id: JoinId) -> &JoinNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: JoinId) -> &mut JoinNode {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// Open a nested scope.
    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Some(parent));
        ScopeId(self.scopes.len() - 1)
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0).copied().flatten()
    }

    /// The scope followed by its enclosing scopes.
    pub fn scope_chain(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut chain = vec![scope];
        let mut current = scope;
        while let Some(parent) = self.scope_parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// FROM items of a scope in creation order.
    pub fn roots(&self, scope: ScopeId) -> Vec<JoinId> {
        self.nodes
            .iter()
            .filter(|n| n.scope == scope && n.origin.is_root())
            .map(|n| n.id)
            .collect()
    }

    /// Non-root nodes of a scope in creation order.
    pub fn joins(&self, scope: ScopeId) -> Vec<JoinId> {
        self.nodes
            .iter()
            .filter(|n| n.scope == scope && !n.origin.is_root())
            .map(|n| n.id)
            .collect()
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Claim a caller-chosen alias.
    pub fn register_alias(&mut self, alias: &str) -> QueryResult<()> {
        if self.aliases.register(alias) {
            Ok(())
        } else {
            Err(QueryError::illegal_override(alias, "alias is already in use"))
        }
    }

    pub fn generate_alias(&mut self, base: &str) -> String {
        self.aliases.generate(base)
    }

    pub fn generate_plain_alias(&mut self, base: &str) -> String {
        self.aliases.generate_plain(base)
    }

    pub fn is_alias_used(&self, alias: &str) -> bool {
        self.aliases.is_used(alias)
    }

    /// Find the node carrying `alias` visible from `scope`.
    pub fn find_alias(&self, alias: &str, scope: ScopeId) -> Option<JoinId> {
        let chain = self.scope_chain(scope);
        self.nodes
            .iter()
            .find(|n| n.alias == alias && chain.contains(&n.scope))
            .map(|n| n.id)
    }

    /// Give a node a caller-chosen alias, releasing its generated one.
    pub fn rename(&mut self, id: JoinId, alias: &str) -> QueryResult<()> {
        self.register_alias(alias)?;
        let old = std::mem::replace(&mut self.nodes[id.0].alias, alias.to_string());
        self.aliases.release(&old);
        log::debug!("renamed join {} to {}", old, alias);
        Ok(())
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    /// Add a FROM item under a caller-chosen alias.
    pub fn add_root(&mut self, entity_type: &str, alias: &str, scope: ScopeId) -> QueryResult<JoinId> {
        self.register_alias(alias)?;
        Ok(self.add_node(JoinNode {
            alias: alias.to_string(),
            scope,
            origin: JoinOrigin::Root,
            entity_type: entity_type.to_string(),
            entity_name: entity_type.to_string(),
            join_type: JoinType::Inner,
            ..Default::default()
        }))
    }

    /// Append a node whose alias the caller already claimed.
    pub fn add_node(&mut self, mut node: JoinNode) -> JoinId {
        let id = JoinId(self.nodes.len());
        node.id = id;
        log::debug!(
            "created {:?} node {} ({}) in scope {}",
            node.origin,
            node.alias,
            node.relation.as_deref().unwrap_or(&node.entity_type),
            node.scope.0
        );
        self.nodes.push(node);
        id
    }

    pub fn lookup(&self, key: &JoinKey) -> Option<JoinId> {
        self.keys.get(key).copied()
    }

    pub fn insert_key(&mut self, key: JoinKey, id: JoinId) {
        self.keys.insert(key, id);
    }

    // =========================================================================
    // Speculation
    // =========================================================================

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            scopes: self.scopes.len(),
        }
    }

    /// Drop every node and scope created after the checkpoint.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        for node in self.nodes.drain(checkpoint.nodes..) {
            log::debug!("rolled back join {}", node.alias);
            self.aliases.release(&node.alias);
        }
        self.keys.retain(|_, id| id.0 < checkpoint.nodes);
        self.scopes.truncate(checkpoint.scopes);
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    /// Nodes `id` needs to be rendered first: its parent and everything its
    /// ON clause references.
    pub fn dependencies(&self, id: JoinId) -> BTreeSet<JoinId> {
        self.dependencies_with(id, self.node(id).on.as_ref())
    }

    fn dependencies_with(&self, id: JoinId, on: Option<&Expr>) -> BTreeSet<JoinId> {
        let mut deps = BTreeSet::new();
        if let Some(parent) = self.node(id).parent {
            deps.insert(parent);
        }
        if let Some(on) = on {
            deps.extend(on.referenced_joins(self));
        }
        deps.remove(&id);
        deps
    }

    /// Whether giving `id` the ON clause `on` makes the dependency graph cyclic.
    pub fn creates_cycle_with(&self, id: JoinId, on: &Expr) -> bool {
        let mut graph: DiGraph<JoinId, ()> = DiGraph::new();
        let indices: Vec<NodeIndex> = self.nodes.iter().map(|n| graph.add_node(n.id)).collect();
        for node in &self.nodes {
            let deps = if node.id == id {
                self.dependencies_with(id, Some(on))
            } else {
                self.dependencies(node.id)
            };
            for dep in deps {
                graph.add_edge(indices[dep.0], indices[node.id.0], ());
            }
        }
        is_cyclic_directed(&graph)
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: JoinId) -> Vec<JoinId> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent).parent;
        }
        out
    }
}
