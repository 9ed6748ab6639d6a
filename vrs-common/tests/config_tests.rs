//! Tests for configuration file resolution and loading
//!
//! Tests that manipulate environment variables are marked with #[serial]
//! so they run sequentially.

use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use vrs_common::config::{load_or_default, load_toml, parse_toml, resolve_config_path, user_config_file};
use vrs_common::Error;

const TEST_ENV_VAR: &str = "VRS_CONFIG_TEST";

#[derive(Debug, Deserialize, Default, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    name: String,
    #[serde(default = "default_count")]
    count: u32,
}

fn default_count() -> u32 {
    7
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(TEST_ENV_VAR, "/from/env.toml");

    let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), TEST_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(TEST_ENV_VAR, "/from/env.toml");

    let resolved = resolve_config_path(None, TEST_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(TEST_ENV_VAR, "   ");

    let resolved = resolve_config_path(None, TEST_ENV_VAR);
    let expected = user_config_file().filter(|p| p.exists());
    assert_eq!(resolved, expected);

    env::remove_var(TEST_ENV_VAR);
}

#[test]
fn test_load_toml_applies_serde_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "name = \"kiosk\"").expect("write config");

    let config: SampleConfig = load_toml(file.path()).expect("load config");
    assert_eq!(config.name, "kiosk");
    assert_eq!(config.count, 7);
}

#[test]
fn test_load_toml_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result: Result<SampleConfig, _> = load_toml(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_parse_error_is_config_error() {
    let result: Result<SampleConfig, _> = parse_toml("count = \"not a number\"");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_load_or_default_reads_cli_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "count = 3").expect("write config");

    let config: SampleConfig =
        load_or_default(Some(file.path()), TEST_ENV_VAR).expect("load config");
    assert_eq!(config.count, 3);
    assert_eq!(config.name, "");
}
