use crate::models::workshop::WorkshopId;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Server configuration from config.yaml
///
/// Every section has defaults matching a stock LinuxGSM `arma3server`
/// install, so a partial file is enough to get going.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub user: UserCredentials,

    /// Path to the steamcmd executable
    pub steamcmd: Utf8PathBuf,

    /// Steam application id the Workshop items belong to
    pub arma3_workshop_id: u32,

    /// LinuxGSM script name, relative to `paths.base_path`. Empty disables restarts.
    pub lgsm_binary: String,

    pub modpack: ModpackConfig,

    pub paths: PathsConfig,

    pub retry: RetryConfig,

    pub steamcmd_timeout_secs: u64,

    pub http_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            user: UserCredentials::default(),
            steamcmd: Utf8PathBuf::from("/usr/games/steamcmd"),
            arma3_workshop_id: 107410,
            lgsm_binary: "arma3server".to_string(),
            modpack: ModpackConfig::default(),
            paths: PathsConfig::default(),
            retry: RetryConfig::default(),
            steamcmd_timeout_secs: 1800,
            http_timeout_secs: 30,
        }
    }
}

/// Steam login used by steamcmd
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Mods that need special handling plus the DLC list for presets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModpackConfig {
    pub name: String,

    /// Server-side only; no key is linked for these
    pub server_mods: IndexSet<String>,

    /// Listed under "Optional Mods" in the preset
    pub optional_mods: IndexSet<String>,

    /// Creator DLC listed at the end of the preset
    pub dlc: Vec<DlcEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlcEntry {
    pub name: String,
    /// Steam store app id
    pub app_id: WorkshopId,
}

impl Default for ModpackConfig {
    fn default() -> Self {
        Self {
            name: "Modpack".to_string(),
            server_mods: IndexSet::new(),
            optional_mods: IndexSet::new(),
            dlc: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub base_path: Utf8PathBuf,
    pub mod_directory: Utf8PathBuf,
    pub key_directory: Utf8PathBuf,

    /// The server config LinuxGSM starts the server with
    pub config_file: Utf8PathBuf,

    /// Directory holding the configs `activate-config` can switch between
    pub mod_config_folder: Utf8PathBuf,

    /// Steam's `workshop/content` directory (without the app id)
    pub workshop_dir: Utf8PathBuf,

    pub log_path: Utf8PathBuf,

    pub preset_output: Utf8PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_path: Utf8PathBuf::from("/home/arma3server"),
            mod_directory: Utf8PathBuf::from("serverfiles/mods"),
            key_directory: Utf8PathBuf::from("serverfiles/keys"),
            config_file: Utf8PathBuf::from("serverfiles/cfg/arma3server.server.cfg"),
            mod_config_folder: Utf8PathBuf::from("configs"),
            workshop_dir: Utf8PathBuf::from(
                "/home/arma3server/.local/share/Steam/steamapps/workshop/content",
            ),
            log_path: Utf8PathBuf::from("log/console/arma3server-console.log"),
            preset_output: Utf8PathBuf::from("modpack.html"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Resolve a configured path against `paths.base_path`.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.paths.base_path.join(path)
    }

    /// Directory holding one folder per downloaded Workshop item
    pub fn workshop_root(&self) -> Utf8PathBuf {
        self.paths
            .workshop_dir
            .join(self.arma3_workshop_id.to_string())
    }

    pub fn mods_dir(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.mod_directory)
    }

    pub fn keys_dir(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.key_directory)
    }

    pub fn server_config_file(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.config_file)
    }

    pub fn mod_config_folder(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.mod_config_folder)
    }

    pub fn server_log(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.log_path)
    }

    pub fn preset_output(&self) -> Utf8PathBuf {
        self.resolve(&self.paths.preset_output)
    }

    /// Full path of the LinuxGSM script, if one is configured
    pub fn lgsm_path(&self) -> Option<Utf8PathBuf> {
        if self.lgsm_binary.trim().is_empty() {
            None
        } else {
            Some(self.resolve(Utf8Path::new(&self.lgsm_binary)))
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }

    pub fn steamcmd_timeout(&self) -> Duration {
        Duration::from_secs(self.steamcmd_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
