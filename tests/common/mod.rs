//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use criteria::config::QueryConfig;
use criteria::metadata::StaticMetamodel;
use criteria::sql::dialect::Dialect;

pub const MODEL_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/document_model.toml");

pub fn metamodel() -> StaticMetamodel {
    StaticMetamodel::from_file(MODEL_PATH).expect("fixture metamodel should load")
}

pub fn config(dialect: Dialect) -> QueryConfig {
    QueryConfig::for_dialect(dialect)
}

pub fn h2() -> QueryConfig {
    config(Dialect::H2)
}
