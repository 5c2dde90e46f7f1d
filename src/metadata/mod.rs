//! Metamodel abstraction.
//!
//! The builder never introspects a database. Everything it knows about
//! entity types, their attributes and the shape of those attributes comes
//! through the [`Metamodel`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Metamodel                          │
//! │  resolve_attribute(owner, name) -> AttributeInfo         │
//! │  entity_type / id_attribute / attribute_names            │
//! │  is_subtype / is_embeddable / is_cte_type                │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   StaticMetamodel                        │
//! │          (in-memory, loadable from TOML)                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use criteria::metadata::{Metamodel, StaticMetamodel};
//!
//! let model = StaticMetamodel::from_file("model.toml")?;
//! let owner = model.resolve_attribute("Document", "owner").unwrap();
//! assert_eq!(owner.target_type, "Person");
//! ```

mod provider;

pub use provider::{MetamodelError, StaticMetamodel};

use serde::{Deserialize, Serialize};

/// Shape of an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// To-one attribute.
    #[default]
    Singular,
    Set,
    /// Unordered collection allowing duplicates.
    Bag,
    List,
    Map,
}

impl Cardinality {
    pub fn is_plural(&self) -> bool {
        !matches!(self, Cardinality::Singular)
    }

    /// Whether elements are addressed by key or index.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Cardinality::List | Cardinality::Map)
    }
}

/// Kind of the (element) type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// Scalar value such as `String` or `Integer`.
    Basic,
    /// Value object stored inline with its owner.
    Embeddable,
    /// Managed entity, reachable through a join.
    #[default]
    Entity,
}

/// What the metamodel knows about one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    /// Type of the value, or of the element for plural attributes.
    pub target_type: String,
    pub kind: AttributeKind,
    pub cardinality: Cardinality,
    /// Key type of map attributes.
    pub map_key_type: Option<String>,
    pub nullable: bool,
}

/// Read-only schema collaborator consulted during path resolution.
///
/// Implementations must be cheap to query; the resolver calls into them
/// once per path segment.
pub trait Metamodel: Send + Sync {
    /// Look up an attribute declared on `owner` or one of its supertypes.
    fn resolve_attribute(&self, owner: &str, name: &str) -> Option<AttributeInfo>;

    /// Whether `type_name` denotes a CTE type.
    fn is_cte_type(&self, type_name: &str) -> bool;

    /// Name under which the type is referenced in query text.
    fn entity_name(&self, type_name: &str) -> String {
        type_name.to_string()
    }

    /// Entity type for an entity name, if it is one.
    fn entity_type(&self, entity_name: &str) -> Option<String>;

    /// Name of the id attribute.
    fn id_attribute(&self, type_name: &str) -> Option<String>;

    /// Attribute names of a type in name order, supertypes included.
    fn attribute_names(&self, type_name: &str) -> Vec<String>;

    /// Whether `sub` is `sup` or inherits from it.
    fn is_subtype(&self, sub: &str, sup: &str) -> bool;

    fn is_embeddable(&self, type_name: &str) -> bool;
}
