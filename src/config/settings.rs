//! TOML-based configuration for criteria.
//!
//! Example configuration:
//! ```toml
//! [query]
//! dialect = "postgres"
//! optimized_keyset = true
//! implicit_group_by = true
//! size_to_count = true
//! id_access_without_join = false
//!
//! [capabilities]
//! supports_row_value_comparison = false
//!
//! [functions]
//! aggregates = ["group_concat"]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::query_config::{Capabilities, CapabilityOverrides, FunctionRegistry, QueryConfig};
use crate::sql::dialect::Dialect;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "CRITERIA_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Query building options.
    pub query: QuerySettings,

    /// Overrides of the dialect capabilities.
    pub capabilities: CapabilityOverrides,

    /// Function registry additions.
    pub functions: FunctionSettings,
}

/// Query building options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Dialect name (h2, postgres, mysql, tsql, duckdb).
    pub dialect: String,

    pub optimized_keyset: bool,

    pub implicit_group_by: bool,

    pub size_to_count: bool,

    pub id_access_without_join: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            dialect: "h2".to_string(),
            optimized_keyset: true,
            implicit_group_by: true,
            size_to_count: true,
            id_access_without_join: false,
        }
    }
}

/// Function registry additions.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FunctionSettings {
    /// Extra aggregate function names.
    pub aggregates: Vec<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Find settings in the default locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `CRITERIA_CONFIG`
    /// 2. `./criteria.toml`
    ///
    /// Returns defaults if neither exists.
    pub fn discover() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            log::debug!("loading settings from ${} = {}", CONFIG_ENV_VAR, path);
            return Self::load(&path);
        }

        let local_config = PathBuf::from("criteria.toml");
        if local_config.exists() {
            log::debug!("loading settings from {}", local_config.display());
            return Self::load(&local_config);
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        self.dialect()?;
        if let Some(name) = self
            .functions
            .aggregates
            .iter()
            .find(|name| name.trim().is_empty())
        {
            return Err(SettingsError::InvalidConfig(format!(
                "aggregate function name '{}' is empty",
                name
            )));
        }
        Ok(())
    }

    /// The configured dialect.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        Dialect::from_name(&self.query.dialect)
            .ok_or_else(|| SettingsError::UnknownDialect(self.query.dialect.clone()))
    }

    /// Build the configuration passed to builders.
    pub fn query_config(&self) -> Result<QueryConfig, SettingsError> {
        let dialect = self.dialect()?;
        let mut functions = FunctionRegistry::default();
        for name in &self.functions.aggregates {
            functions.register_aggregate(name);
        }
        Ok(QueryConfig {
            dialect,
            capabilities: Capabilities::for_dialect(dialect).with_overrides(&self.capabilities),
            optimized_keyset: self.query.optimized_keyset,
            implicit_group_by: self.query.implicit_group_by,
            size_to_count: self.query.size_to_count,
            id_access_without_join: self.query.id_access_without_join,
            functions,
        })
    }
}
