//! a3modman - Steam Workshop mod manager for Arma 3 dedicated servers
//!
//! # Usage
//!
//! ```text
//! a3modman [--config-dir DIR] [--log-dir DIR] [--debug] [--quiet] <command>
//!
//! a3modman init
//! a3modman update-mods
//! a3modman preset [--from-server-config] [--output PATH]
//! a3modman activate-config --name <file> [--restart] [--force]
//! a3modman restart [--force]
//! ```
//!
//! # Configuration Files
//!
//! Expected in the config directory (default: current directory):
//! - `config.yaml`: Steam login, server paths, modpack lists, retry policy
//! - `mods.yaml` (or legacy `mods.json`): mod folder name to Workshop id
//!
//! Any config.yaml value can be overridden from the environment, e.g.
//! `A3MODMAN_USER__PASSWORD`.

use a3modman::services::{
    self, ModSynchronizer, RestartDecision, RestartGuard, SteamCmd, SteamWorkshopClient,
    SyncSettings, SystemProcessInspector,
};
use a3modman::{APP_NAME, ConfigManager, ModStatus, ServerConfig, VERSION};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "a3modman",
    version,
    about = "Manage Steam Workshop mods for an Arma 3 dedicated server",
    long_about = None,
)]
struct Cli {
    /// Directory containing config.yaml and mods.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Directory for rotating log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Only log to the log file
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write default config.yaml and mods.yaml if they don't exist.
    Init,

    /// Download/update all mods, lowercase them and relink mods and keys.
    UpdateMods,

    /// Generate an Arma 3 Launcher preset.
    Preset(PresetArgs),

    /// Switch the server to another config from the config folder.
    ActivateConfig(ActivateArgs),

    /// Restart the server through LinuxGSM if nobody is playing.
    Restart(RestartArgs),
}

#[derive(Args, Debug)]
struct PresetArgs {
    /// Build the preset from the mods the active server config loads
    #[arg(long)]
    from_server_config: bool,

    /// Output file (default: paths.preset_output, or <title>.html with --from-server-config)
    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
struct ActivateArgs {
    /// Name of the config file to activate
    #[arg(long)]
    name: String,

    /// Restart the server after the config was activated
    #[arg(long)]
    restart: bool,

    /// Restart even if players are on the server
    #[arg(long, requires = "restart")]
    force: bool,
}

#[derive(Args, Debug)]
struct RestartArgs {
    /// Restart even if players are on the server
    #[arg(long)]
    force: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = a3modman::logging::setup_logging(&cli.log_dir, APP_NAME, cli.debug, !cli.quiet)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;

    let success = match cli.command {
        Commands::Init => init(&config_manager)?,
        Commands::UpdateMods => update_mods(&config_manager).await?,
        Commands::Preset(args) => preset(&config_manager, args).await?,
        Commands::ActivateConfig(args) => activate_config(&config_manager, args).await?,
        Commands::Restart(args) => {
            let config = config_manager.load_server_config()?;
            restart(&config, args.force).await?
        }
    };

    tracing::info!("Done!");
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init(config_manager: &ConfigManager) -> Result<bool> {
    let created = config_manager.write_defaults()?;
    if created.is_empty() {
        println!("Configuration already present in {}", config_manager.config_dir());
    }
    for path in created {
        println!("Created {}", path);
    }
    Ok(true)
}

async fn update_mods(config_manager: &ConfigManager) -> Result<bool> {
    let config = config_manager.load_server_config()?;
    let mods = config_manager.load_mod_set()?;

    let synchronizer = ModSynchronizer::new(
        SyncSettings::from_config(&config),
        Arc::new(SteamCmd::new(config.steamcmd.clone(), config.steamcmd_timeout())),
        Arc::new(
            SteamWorkshopClient::new(config.http_timeout())
                .context("Failed to create Workshop HTTP client")?,
        ),
    );

    let report = synchronizer.run(&mods, &config.modpack.server_mods).await;

    for result in report.failures() {
        println!(
            "!! {} [{}] {}: {}",
            result.subject,
            result.step,
            if result.status == ModStatus::TransientFailure {
                "transient"
            } else {
                "permanent"
            },
            result.message
        );
    }
    println!("{}", report.summary());

    Ok(!report.has_failures())
}

async fn preset(config_manager: &ConfigManager, args: PresetArgs) -> Result<bool> {
    let config = config_manager.load_server_config()?;
    let workshop = SteamWorkshopClient::new(config.http_timeout())
        .context("Failed to create Workshop HTTP client")?;

    let (preset, default_output) = if args.from_server_config {
        let modlist =
            services::read_active_modlist(&config.server_config_file(), &config.mods_dir())
                .context("Failed to read the active server config")?;
        let output = config.resolve(Utf8Path::new(&modlist.preset_file_name()));

        let mut modpack = config.modpack.clone();
        if let Some(title) = &modlist.title {
            modpack.name = title.clone();
        }
        // Everything the server loads is required for clients
        modpack.optional_mods.clear();
        modpack.server_mods.clear();

        let preset = services::preset::build_preset(&modlist.mods, &modpack, &workshop).await;
        (preset, output)
    } else {
        let mods = config_manager.load_mod_set()?;
        let preset = services::preset::build_preset(&mods, &config.modpack, &workshop).await;
        (preset, config.preset_output())
    };

    let output = args.output.unwrap_or(default_output);
    preset.write_to(&output)?;
    println!("Wrote {}", output);
    Ok(true)
}

async fn activate_config(config_manager: &ConfigManager, args: ActivateArgs) -> Result<bool> {
    let config = config_manager.load_server_config()?;

    let target = services::activate_config(
        &config.mod_config_folder(),
        &config.server_config_file(),
        &args.name,
    )
    .with_context(|| format!("Failed to activate config '{}'", args.name))?;
    println!("Activated {}", target);

    if args.restart {
        restart(&config, args.force).await
    } else {
        Ok(true)
    }
}

async fn restart(config: &ServerConfig, force: bool) -> Result<bool> {
    let guard = RestartGuard::new(config, Arc::new(SystemProcessInspector));

    let decision = guard.decide(force)?;
    match &decision {
        RestartDecision::NoBinary => {
            println!("No LinuxGSM script configured, or script not found. Cannot restart.");
            return Ok(false);
        }
        RestartDecision::NotRunning => println!("Server not running."),
        RestartDecision::PlayersOnline(players) => {
            println!(
                "Server not empty ({} online) and --force not supplied.",
                players.len()
            );
            return Ok(false);
        }
        RestartDecision::Restart { .. } => {}
    }

    if guard.execute(&decision).await? {
        println!("Server restarted.");
    }
    Ok(true)
}
