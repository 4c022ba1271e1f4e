// a3modman - Steam Workshop mod manager for Arma 3 dedicated servers
//
// This is the library crate containing the core business logic and data structures.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{ModResult, ModSet, ModStatus, ServerConfig, SyncReport, SyncStep, WorkshopId};
pub use services::{ModSynchronizer, SyncSettings};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
