//! Root folder and config file resolution
//!
//! Tests touching TXDATA_* environment variables run under #[serial].

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use txdata_common::config::{
    default_root_folder, resolve_config_path, RootFolderInitializer, RootFolderResolver,
    TomlConfig, CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, &TomlConfig::default());
    assert_eq!(resolver.resolve(), default_root_folder());
}

#[test]
#[serial]
fn test_cli_argument_beats_environment() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/txdata-env");

    let resolver = RootFolderResolver::new(Some(PathBuf::from("/tmp/txdata-cli")), &TomlConfig::default());
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/txdata-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_environment_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/txdata-env");
    let config = TomlConfig::from_toml_str("root_folder = \"/tmp/txdata-toml\"").unwrap();

    let resolver = RootFolderResolver::new(None, &config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/txdata-env"));

    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, &config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/txdata-toml"));
}

#[test]
#[serial]
fn test_config_path_resolution() {
    env::set_var(CONFIG_FILE_ENV, "/tmp/txdata-config.toml");
    assert_eq!(resolve_config_path(None), PathBuf::from("/tmp/txdata-config.toml"));
    assert_eq!(
        resolve_config_path(Some(Path::new("/etc/tx.toml"))),
        PathBuf::from("/etc/tx.toml")
    );
    env::remove_var(CONFIG_FILE_ENV);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\nport = 8081\n\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_initializer_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");

    let init = RootFolderInitializer::new(root.clone());
    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(init.projects_path().is_dir());
    assert!(init.workspace_path().is_dir());
}
