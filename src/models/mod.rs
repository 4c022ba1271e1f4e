//! Data models for a3modman.
//!
//! - [`ServerConfig`]: server paths, Steam login, retry policy and modpack lists from `config.yaml`
//! - [`ModSet`]: mod folder name to [`WorkshopId`] mapping from `mods.yaml` / `mods.json`
//! - [`SyncReport`]: per-mod results of a synchronization pass

pub mod config;
pub mod report;
pub mod workshop;

pub use config::{DlcEntry, ModpackConfig, PathsConfig, RetryConfig, ServerConfig, UserCredentials};
pub use report::{ModResult, ModStatus, SyncReport, SyncStep};
pub use workshop::{InvalidWorkshopId, ModSet, WorkshopId};
