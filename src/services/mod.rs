//! Services module - business logic for managing the server's Workshop mods.
//!
//! # Components
//!
//! - [`ModSynchronizer`]: downloads and refreshes mods, normalizes file casing and
//!   reconciles the server's mod and key symlinks with the configured [`ModSet`](crate::models::ModSet)
//! - [`SteamCmd`]: the [`Downloader`] that shells out to steamcmd
//! - [`SteamWorkshopClient`]: the [`WorkshopClient`] that scrapes changelog dates and titles
//! - [`preset`]: Arma 3 Launcher preset generation
//! - [`server_config`]: switching the active server config and reading its modlist
//! - [`RestartGuard`]: restarts the server through LinuxGSM only when it is empty
//!
//! The downloader, Workshop client and process inspector are traits so the
//! synchronizer and restart guard can be exercised without steamcmd, the
//! network or a running server.
//!
//! # Usage Example
//!
//! ```ignore
//! use a3modman::services::{ModSynchronizer, SteamCmd, SteamWorkshopClient, SyncSettings};
//! use std::sync::Arc;
//!
//! let sync = ModSynchronizer::new(
//!     SyncSettings::from_config(&config),
//!     Arc::new(SteamCmd::new(config.steamcmd.clone(), config.steamcmd_timeout())),
//!     Arc::new(SteamWorkshopClient::new(config.http_timeout())?),
//! );
//! let report = sync.run(&mods, &config.modpack.server_mods).await;
//! println!("{}", report.summary());
//! ```

pub mod preset;
pub mod restart;
pub mod server_config;
pub mod steamcmd;
pub mod symlink;
pub mod sync;
pub mod workshop;

pub use preset::{Preset, PresetEntry, PresetError};
pub use restart::{
    PlayerLogParser, ProcessInspector, RestartDecision, RestartError, RestartGuard,
    SystemProcessInspector,
};
pub use server_config::{ActiveModlist, ServerConfigError, activate_config, read_active_modlist};
pub use steamcmd::{DownloadError, DownloadRequest, Downloader, SteamCmd};
pub use sync::{ModSynchronizer, RetryPolicy, SyncError, SyncSettings};
pub use workshop::{SteamWorkshopClient, WorkshopClient, WorkshopError, WorkshopPageParser};
