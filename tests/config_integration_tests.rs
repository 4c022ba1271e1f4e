//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Loading partial config.yaml files over the defaults
//! - Environment overrides
//! - Mod list loading from mods.yaml and the legacy mods.json
//! - Default file generation

use a3modman::{ConfigManager, WorkshopId};
use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn no_env() -> Option<config::Map<String, String>> {
    Some(config::Map::new())
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.server_config_path(), config_path.join("config.yaml"));
}

#[test]
fn test_creates_missing_config_dir() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("a/b");

    ConfigManager::new(&nested).unwrap();
    assert!(nested.is_dir());
}

#[test]
fn test_partial_config_keeps_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(
        config_path.join("config.yaml"),
        r#"
user:
  username: steamuser
  password: hunter2
paths:
  base_path: /srv/arma3
modpack:
  name: Ops Night
  server_mods:
    - "@blastcore_server"
  dlc:
    - name: Global Mobilization
      app_id: 1042220
"#,
    )
    .unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let config = manager.load_server_config_with_env(no_env()).unwrap();

    assert_eq!(config.user.username, "steamuser");
    assert_eq!(config.user.password, "hunter2");
    assert_eq!(config.arma3_workshop_id, 107410);
    assert_eq!(config.retry.max_attempts, 10);
    assert_eq!(config.modpack.name, "Ops Night");
    assert!(config.modpack.server_mods.contains("@blastcore_server"));
    assert_eq!(config.modpack.dlc[0].name, "Global Mobilization");
    assert_eq!(config.modpack.dlc[0].app_id, WorkshopId::new(1042220));
    assert_eq!(
        config.mods_dir(),
        Utf8PathBuf::from("/srv/arma3/serverfiles/mods")
    );
}

#[test]
fn test_invalid_config_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("config.yaml"), "retry:\n  max_attempts: lots\n").unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    assert!(manager.load_server_config_with_env(no_env()).is_err());
}

#[test]
fn test_env_override_without_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut env = config::Map::new();
    env.insert("A3MODMAN_USER__USERNAME".to_string(), "fromenv".to_string());
    env.insert("A3MODMAN_LGSM_BINARY".to_string(), "arma3server-2".to_string());

    let config = manager.load_server_config_with_env(Some(env)).unwrap();
    assert_eq!(config.user.username, "fromenv");
    assert_eq!(config.lgsm_binary, "arma3server-2");
}

#[test]
fn test_mod_set_preserves_file_order() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(
        config_path.join("mods.yaml"),
        "\"@cba_a3\": 450814997\n\"@ace\": \"463939057\"\n\"@acre2\": 751965892\n",
    )
    .unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let mods = manager.load_mod_set().unwrap();

    assert_eq!(
        mods.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["@cba_a3", "@ace", "@acre2"]
    );
    assert_eq!(mods["@ace"], WorkshopId::new(463939057));
}

#[test]
fn test_legacy_json_mod_set() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(
        config_path.join("mods.json"),
        r#"{"@cba_a3": "450814997", "@ace": 463939057}"#,
    )
    .unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let mods = manager.load_mod_set().unwrap();

    assert_eq!(mods.len(), 2);
    assert_eq!(mods["@cba_a3"], WorkshopId::new(450814997));
}

#[test]
fn test_yaml_mod_set_wins_over_legacy_json() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("mods.yaml"), "\"@ace\": 463939057\n").unwrap();
    fs::write(config_path.join("mods.json"), r#"{"@cba_a3": 450814997}"#).unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let mods = manager.load_mod_set().unwrap();

    assert_eq!(mods.len(), 1);
    assert!(mods.contains_key("@ace"));
}

#[test]
fn test_empty_mods_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("mods.yaml"), "\n").unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    assert!(manager.load_mod_set().unwrap().is_empty());
}

#[test]
fn test_invalid_mod_id_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("mods.yaml"), "\"@cba_a3\": not-a-number\n").unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    assert!(manager.load_mod_set().is_err());
}

#[test]
fn test_write_defaults_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let created = manager.write_defaults().unwrap();
    assert_eq!(created.len(), 2);

    let config = manager.load_server_config_with_env(no_env()).unwrap();
    assert_eq!(config.steamcmd, Utf8PathBuf::from("/usr/games/steamcmd"));

    let mods = manager.load_mod_set().unwrap();
    assert_eq!(mods["@cba_a3"], WorkshopId::new(450814997));
}

#[test]
fn test_write_defaults_keeps_existing_files() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("mods.json"), r#"{"@ace": 463939057}"#).unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let created = manager.write_defaults().unwrap();

    assert_eq!(created, vec![config_path.join("config.yaml")]);
    assert!(!config_path.join("mods.yaml").exists());
}
