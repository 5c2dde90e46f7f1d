//! Configuration module.
//!
//! [`Settings`] is the serialized form read from `criteria.toml`;
//! [`QueryConfig`] is the resolved form handed to builders.

mod query_config;
mod settings;

pub use query_config::{Capabilities, CapabilityOverrides, FunctionRegistry, QueryConfig};
pub use settings::{FunctionSettings, QuerySettings, Settings, SettingsError, CONFIG_ENV_VAR};
