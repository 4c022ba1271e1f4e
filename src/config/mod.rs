use crate::models::{ModSet, ServerConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Prefix for environment variables that override config.yaml values,
/// e.g. `A3MODMAN_USER__PASSWORD` overrides `user.password`.
pub const ENV_PREFIX: &str = "A3MODMAN";

/// Configuration manager for loading and saving the server configuration files.
///
/// Manages two files in one directory:
/// - Server config (`config.yaml`): Steam login, server paths, modpack lists
/// - Mod set (`mods.yaml`, or legacy `mods.json`): mod folder name to Workshop id
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    server_config_path: Utf8PathBuf,
    mods_path: Utf8PathBuf,
    legacy_mods_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            server_config_path: config_dir.join("config.yaml"),
            mods_path: config_dir.join("mods.yaml"),
            legacy_mods_path: config_dir.join("mods.json"),
            config_dir,
        })
    }

    /// Load the server configuration, applying `A3MODMAN_*` environment overrides.
    ///
    /// # Returns
    /// The loaded ServerConfig, or defaults if the file doesn't exist
    pub fn load_server_config(&self) -> Result<ServerConfig> {
        self.load_server_config_with_env(None)
    }

    /// Same as [`load_server_config`](Self::load_server_config), but reads
    /// overrides from `env` instead of the process environment when given.
    pub fn load_server_config_with_env(
        &self,
        env: Option<config::Map<String, String>>,
    ) -> Result<ServerConfig> {
        let mut builder = Config::builder();

        if self.server_config_path.exists() {
            builder = builder.add_source(
                File::new(self.server_config_path.as_str(), FileFormat::Yaml).required(true),
            );
        } else {
            tracing::warn!(
                "Server config file not found at {}, using defaults",
                self.server_config_path
            );
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()
            .with_context(|| {
                format!("Failed to read server config: {}", self.server_config_path)
            })?;

        let config: ServerConfig = settings.try_deserialize().with_context(|| {
            format!("Failed to parse server config: {}", self.server_config_path)
        })?;

        tracing::info!("Loaded server config from {}", self.server_config_path);
        Ok(config)
    }

    /// Save the server configuration file.
    pub fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(config)
            .context("Failed to serialize server config to YAML")?;

        fs::write(&self.server_config_path, yaml_string).with_context(|| {
            format!("Failed to write server config: {}", self.server_config_path)
        })?;

        tracing::info!("Saved server config to {}", self.server_config_path);
        Ok(())
    }

    /// Load the mod set.
    ///
    /// Tries `mods.yaml` first and falls back to the legacy `mods.json`.
    ///
    /// # Returns
    /// The loaded ModSet in file order, or an empty set if neither file exists
    pub fn load_mod_set(&self) -> Result<ModSet> {
        if self.mods_path.exists() {
            let file_contents = fs::read_to_string(&self.mods_path)
                .with_context(|| format!("Failed to read mod list: {}", self.mods_path))?;

            // An empty YAML document deserializes as null, not as an empty map
            if file_contents.trim().is_empty() {
                return Ok(ModSet::new());
            }

            let mods: ModSet = serde_yaml_ng::from_str(&file_contents)
                .with_context(|| format!("Failed to parse mod list: {}", self.mods_path))?;

            tracing::info!("Loaded {} mods from {}", mods.len(), self.mods_path);
            return Ok(mods);
        }

        if self.legacy_mods_path.exists() {
            tracing::info!("Using legacy mod list: {}", self.legacy_mods_path);

            let file_contents = fs::read_to_string(&self.legacy_mods_path).with_context(|| {
                format!("Failed to read mod list: {}", self.legacy_mods_path)
            })?;

            let mods: ModSet = serde_json::from_str(&file_contents).with_context(|| {
                format!("Failed to parse mod list: {}", self.legacy_mods_path)
            })?;

            tracing::info!("Loaded {} mods from {}", mods.len(), self.legacy_mods_path);
            return Ok(mods);
        }

        tracing::warn!(
            "Mod list not found at {} or {}, nothing to manage",
            self.mods_path,
            self.legacy_mods_path
        );
        Ok(ModSet::new())
    }

    /// Save the mod set as `mods.yaml`.
    pub fn save_mod_set(&self, mods: &ModSet) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(mods).context("Failed to serialize mod list to YAML")?;

        fs::write(&self.mods_path, yaml_string)
            .with_context(|| format!("Failed to write mod list: {}", self.mods_path))?;

        tracing::info!("Saved mod list to {}", self.mods_path);
        Ok(())
    }

    /// Write default `config.yaml` and `mods.yaml` files where none exist yet.
    ///
    /// # Returns
    /// The paths of the files that were created
    pub fn write_defaults(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut created = Vec::new();

        if !self.server_config_path.exists() {
            self.save_server_config(&ServerConfig::default())?;
            created.push(self.server_config_path.clone());
        }

        if !self.mods_path.exists() && !self.legacy_mods_path.exists() {
            let mut mods = ModSet::new();
            mods.insert("@cba_a3".to_string(), 450814997.into());
            self.save_mod_set(&mods)?;
            created.push(self.mods_path.clone());
        }

        Ok(created)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn server_config_path(&self) -> &Utf8Path {
        &self.server_config_path
    }
}
