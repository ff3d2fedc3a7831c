//! Integration tests for configuration file resolution and graceful degradation
//!
//! - Missing TOML files SHALL NOT cause termination
//! - Priority order: CLI path > LOOPMIX_CONFIG > platform default
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate LOOPMIX_CONFIG are marked with #[serial].

use loopmix_common::config::{ConfigResolver, ConfigSource, TomlConfig, CONFIG_ENV_VAR};
use loopmix_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "cli.toml", "[mixer]\npoll_interval_ms = 40\n");
    let from_env = write_config(&dir, "env.toml", "[mixer]\npoll_interval_ms = 250\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let resolver = ConfigResolver::new(Some(cli.clone()));
    assert_eq!(resolver.resolve(), Some(cli.clone()));
    let (config, source) = resolver.load_or_default().unwrap();
    assert_eq!(config.mixer.poll_interval_ms, 40);
    assert_eq!(source, ConfigSource::File(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let from_env = write_config(
        &dir,
        "env.toml",
        "[logging]\nlevel = \"debug\"\n\n[mixer]\nsearch_keyword = \"rain\"\n",
    );
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let (config, source) = ConfigResolver::new(None).load_or_default().unwrap();
    assert_eq!(source, ConfigSource::File(from_env));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.mixer.search_keyword, "rain");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let (config, source) = ConfigResolver::new(Some(missing.clone()))
        .load_or_default()
        .unwrap();
    assert_eq!(config, TomlConfig::default());
    // Reported to the caller so the warning can be logged after tracing init
    assert_eq!(source, ConfigSource::Missing(missing));
}

#[test]
#[serial]
fn test_invalid_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let bad = write_config(&dir, "bad.toml", "[mixer]\ndefault_volume = 150\n");

    let err = ConfigResolver::new(Some(bad)).load_or_default().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_log_file_path_parsed() {
    let config = TomlConfig::from_toml_str("[logging]\nfile = \"/tmp/loopmix.log\"\n").unwrap();
    assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/loopmix.log")));
    assert_eq!(config.logging.level, "info");
}
