//! In-memory metamodel loadable from TOML.
//!
//! ```toml
//! [types.Document]
//! kind = "entity"
//! id = "id"
//!
//! [types.Document.attributes]
//! id = { type = "Long", nullable = false }
//! name = { type = "String" }
//! owner = { type = "Person", nullable = false }
//! contacts = { type = "Person", collection = "map", key = "Integer" }
//!
//! [types.NameObject]
//! kind = "embeddable"
//! ```
//!
//! Attribute types that are not declared under `[types]` are basic types.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{AttributeInfo, AttributeKind, Cardinality, Metamodel};

/// Error type for metamodel loading.
#[derive(Debug, thiserror::Error)]
pub enum MetamodelError {
    #[error("Metamodel file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read metamodel file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse metamodel file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Type '{owner}' extends unknown type '{parent}'")]
    UnknownSupertype { owner: String, parent: String },

    #[error("Type '{0}' has an inheritance cycle")]
    InheritanceCycle(String),

    #[error("Map attribute '{owner}.{attribute}' has no key type")]
    MissingMapKey { owner: String, attribute: String },
}

/// Kind of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Entity,
    Embeddable,
}

/// A declared entity or embeddable type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeDef {
    pub kind: TypeKind,
    /// Id attribute name; inherited from the supertype when absent.
    pub id: Option<String>,
    pub extends: Option<String>,
    /// Whether the type is a CTE type.
    pub cte: bool,
    /// Entity name used in query text, defaults to the type name.
    pub entity_name: Option<String>,
    pub attributes: BTreeMap<String, AttributeDef>,
}

/// A declared attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type")]
    pub type_name: String,
    /// `set`, `bag`, `list` or `map`. Absent for singular attributes.
    #[serde(default)]
    pub collection: Option<Cardinality>,
    /// Key type of a map attribute.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetamodelFile {
    #[serde(default)]
    types: BTreeMap<String, TypeDef>,
}

/// Metamodel backed by a fixed set of type declarations.
#[derive(Debug, Clone, Default)]
pub struct StaticMetamodel {
    types: BTreeMap<String, TypeDef>,
}

impl StaticMetamodel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a metamodel from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetamodelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MetamodelError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a metamodel from TOML text and validate it.
    pub fn from_toml(content: &str) -> Result<Self, MetamodelError> {
        let file: MetamodelFile = toml::from_str(content)?;
        let model = Self { types: file.types };
        model.validate()?;
        log::debug!("loaded metamodel with {} types", model.types.len());
        Ok(model)
    }

    /// Add or replace a type declaration.
    pub fn with_type(mut self, name: impl Into<String>, def: TypeDef) -> Self {
        self.types.insert(name.into(), def);
        self
    }

    fn validate(&self) -> Result<(), MetamodelError> {
        for (name, def) in &self.types {
            if let Some(parent) = &def.extends {
                if !self.types.contains_key(parent) {
                    return Err(MetamodelError::UnknownSupertype {
                        owner: name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            // Walking more steps than there are types means a cycle.
            let mut current = def.extends.as_deref();
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > self.types.len() {
                    return Err(MetamodelError::InheritanceCycle(name.clone()));
                }
                current = self.types.get(parent).and_then(|d| d.extends.as_deref());
            }
            for (attr, def) in &def.attributes {
                if def.collection == Some(Cardinality::Map) && def.key.is_none() {
                    return Err(MetamodelError::MissingMapKey {
                        owner: name.clone(),
                        attribute: attr.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The type and its supertypes, most specific first.
    fn hierarchy<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = (&'a str, &'a TypeDef)> {
        let mut current = Some(type_name);
        let mut remaining = self.types.len() + 1;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let name = current?;
            let (key, def) = self.types.get_key_value(name)?;
            current = def.extends.as_deref();
            Some((key.as_str(), def))
        })
    }

    fn kind_of(&self, type_name: &str) -> AttributeKind {
        match self.types.get(type_name).map(|d| d.kind) {
            Some(TypeKind::Entity) => AttributeKind::Entity,
            Some(TypeKind::Embeddable) => AttributeKind::Embeddable,
            None => AttributeKind::Basic,
        }
    }
}

impl Metamodel for StaticMetamodel {
    fn resolve_attribute(&self, owner: &str, name: &str) -> Option<AttributeInfo> {
        let (declaring, def) = self
            .hierarchy(owner)
            .find_map(|(type_name, def)| def.attributes.get(name).map(|a| (type_name, a)))?;
        let is_id = self.id_attribute(declaring).as_deref() == Some(name);
        Some(AttributeInfo {
            name: name.to_string(),
            target_type: def.type_name.clone(),
            kind: self.kind_of(&def.type_name),
            cardinality: def.collection.unwrap_or_default(),
            map_key_type: def.key.clone(),
            nullable: def.nullable && !is_id,
        })
    }

    fn is_cte_type(&self, type_name: &str) -> bool {
        self.types.get(type_name).is_some_and(|d| d.cte)
    }

    fn entity_name(&self, type_name: &str) -> String {
        self.types
            .get(type_name)
            .and_then(|d| d.entity_name.clone())
            .unwrap_or_else(|| type_name.to_string())
    }

    fn entity_type(&self, entity_name: &str) -> Option<String> {
        self.types
            .iter()
            .find(|(name, def)| {
                def.kind == TypeKind::Entity
                    && def.entity_name.as_deref().unwrap_or(name.as_str()) == entity_name
            })
            .map(|(name, _)| name.clone())
    }

    fn id_attribute(&self, type_name: &str) -> Option<String> {
        self.hierarchy(type_name).find_map(|(_, def)| def.id.clone())
    }

    fn attribute_names(&self, type_name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .hierarchy(type_name)
            .flat_map(|(_, def)| def.attributes.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.hierarchy(sub).any(|(name, _)| name == sup)
    }

    fn is_embeddable(&self, type_name: &str) -> bool {
        self.kind_of(type_name) == AttributeKind::Embeddable
    }
}
