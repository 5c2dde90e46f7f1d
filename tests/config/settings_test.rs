//! Tests for loading settings files and turning them into query configs.

#[path = "../common/mod.rs"]
mod common;

use std::path::PathBuf;

use criteria::config::{Settings, SettingsError, CONFIG_ENV_VAR};
use criteria::sql::dialect::{Dialect, LimitStyle};
use criteria::CriteriaBuilder;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/criteria.toml")
}

#[test]
fn test_load_file() {
    let settings = Settings::load(fixture()).unwrap();
    let config = settings.query_config().unwrap();
    assert_eq!(config.dialect, Dialect::Postgres);
    assert_eq!(config.capabilities.limit_style, LimitStyle::OffsetFetch);
    assert!(config.capabilities.supports_cte_returning);
    assert!(!config.size_to_count);
    assert!(config.implicit_group_by);
    assert!(config.functions.is_aggregate("string_agg"));
}

#[test]
fn test_loaded_config_drives_rendering() {
    let config = Settings::load(fixture()).unwrap().query_config().unwrap();
    let mm = common::metamodel();
    let mut cb = CriteriaBuilder::new(&mm, config);
    cb.from("Document", "d")
        .unwrap()
        .select("d.name")
        .unwrap()
        .select("STRING_AGG(d.owner.name)")
        .unwrap()
        .order_by_asc("d.name")
        .unwrap();
    let page = cb.page(20, 10).unwrap();
    assert_eq!(
        page.object.text,
        "SELECT d.name, STRING_AGG(owner_1.name) FROM Document d JOIN d.owner owner_1 \
         GROUP BY d.name ORDER BY d.name ASC NULLS LAST OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

#[test]
fn test_missing_file() {
    let err = Settings::load("does/not/exist.toml").unwrap_err();
    assert!(matches!(err, SettingsError::FileNotFound(_)));
}

#[test]
fn test_invalid_settings() {
    assert!(matches!(
        Settings::from_toml("[query]\ndialect = \"sqlite\"\n"),
        Err(SettingsError::UnknownDialect(name)) if name == "sqlite"
    ));
    assert!(matches!(
        Settings::from_toml("[functions]\naggregates = [\" \"]\n"),
        Err(SettingsError::InvalidConfig(_))
    ));
    assert!(matches!(
        Settings::from_toml("[query]\noptimized_keyset = \"yes\"\n"),
        Err(SettingsError::ParseError(_))
    ));
}

#[test]
fn test_discover_reads_environment() {
    std::env::set_var(CONFIG_ENV_VAR, fixture());
    let settings = Settings::discover().unwrap();
    std::env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(settings.dialect().unwrap(), Dialect::Postgres);
    assert_eq!(settings.functions.aggregates, vec!["string_agg".to_string()]);
}
