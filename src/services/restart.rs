//! Restart guard: only restart the server when nobody is playing on it.
//!
//! The server's console log is the only record of who is connected, so the
//! connect and disconnect lines are replayed to find the players still online.

use crate::models::ServerConfig;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

const RESTART_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum RestartError {
    #[error("failed to read server log {path}: {source}")]
    Log {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run {path}: {source}")]
    Process {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} restart timed out after {timeout:?}")]
    Timeout { path: Utf8PathBuf, timeout: Duration },

    #[error("{path} restart exited with code {code}")]
    Failed { path: Utf8PathBuf, code: i32 },
}

/// Answers whether a process is running
#[cfg_attr(test, mockall::automock)]
pub trait ProcessInspector: Send + Sync {
    /// True if any process name contains `name`, ignoring case
    fn is_running(&self, name: &str) -> bool;
}

/// [`ProcessInspector`] backed by the OS process table
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessInspector;

impl ProcessInspector for SystemProcessInspector {
    fn is_running(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()),
        );

        system
            .processes()
            .values()
            .any(|process| process.name().to_string_lossy().to_lowercase().contains(&needle))
    }
}

/// Patterns for player connect/disconnect lines in the server console log
#[derive(Debug, Clone)]
pub struct PlayerLogParser {
    /// ` 12:34:56 Player Foo connecting.`
    login_pattern: Regex,

    /// ` 12:34:56 Player Foo disconnected.`
    logout_pattern: Regex,
}

impl PlayerLogParser {
    pub fn new() -> Self {
        Self {
            login_pattern: Regex::new(r"^\s\d+:\d+:\d+\s(Player)\s.*(connecting)\.$")
                .expect("Invalid login regex"),
            logout_pattern: Regex::new(r"^\s\d+:\d+:\d+\s(Player)\s.*\s(disconnected)\.$")
                .expect("Invalid logout regex"),
        }
    }

    /// Players that connected and have not disconnected since, in connect order
    pub fn connected_players<I, S>(&self, lines: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut players: Vec<String> = Vec::new();

        for line in lines {
            let line = line.as_ref();
            let Some(player) = line.split_whitespace().nth(2) else {
                continue;
            };

            if self.login_pattern.is_match(line) {
                players.push(player.to_string());
            }
            if self.logout_pattern.is_match(line) {
                if let Some(pos) = players.iter().position(|p| p == player) {
                    players.remove(pos);
                }
            }
        }

        players
    }

    pub fn connected_players_in(&self, log_path: &Utf8Path) -> Result<Vec<String>, RestartError> {
        let log_err = |source| RestartError::Log {
            path: log_path.to_path_buf(),
            source,
        };

        let file = File::open(log_path).map_err(log_err)?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(log_err)?;

        Ok(self.connected_players(lines))
    }
}

impl Default for PlayerLogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// What the guard decided to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// No LinuxGSM script configured, or it does not exist
    NoBinary,
    NotRunning,
    PlayersOnline(Vec<String>),
    Restart { forced: bool },
}

pub struct RestartGuard {
    lgsm_binary: String,
    lgsm_path: Option<Utf8PathBuf>,
    log_path: Utf8PathBuf,
    inspector: Arc<dyn ProcessInspector>,
    parser: PlayerLogParser,
}

impl RestartGuard {
    pub fn new(config: &ServerConfig, inspector: Arc<dyn ProcessInspector>) -> Self {
        Self {
            lgsm_binary: config.lgsm_binary.clone(),
            lgsm_path: config.lgsm_path(),
            log_path: config.server_log(),
            inspector,
            parser: PlayerLogParser::new(),
        }
    }

    /// Decide whether a restart is safe; `force` ignores connected players
    pub fn decide(&self, force: bool) -> Result<RestartDecision, RestartError> {
        let Some(lgsm_path) = self.lgsm_path.as_ref().filter(|p| p.is_file()) else {
            tracing::warn!("No LinuxGSM script configured, or script not found; cannot restart");
            return Ok(RestartDecision::NoBinary);
        };

        let process_name = lgsm_path.file_name().unwrap_or(self.lgsm_binary.as_str());
        if !self.inspector.is_running(process_name) {
            tracing::info!("Server not running");
            return Ok(RestartDecision::NotRunning);
        }

        tracing::info!("{} is running, checking the log for connected players", lgsm_path);
        let players = self.parser.connected_players_in(&self.log_path)?;

        if players.is_empty() || force {
            if !players.is_empty() {
                tracing::warn!("Forcing restart with {} players online", players.len());
            }
            Ok(RestartDecision::Restart { forced: force })
        } else {
            tracing::info!(
                "Server not empty ({}) and --force not supplied",
                players.join(", ")
            );
            Ok(RestartDecision::PlayersOnline(players))
        }
    }

    /// Run `<lgsm script> restart` if the decision allows it
    pub async fn execute(&self, decision: &RestartDecision) -> Result<bool, RestartError> {
        let (RestartDecision::Restart { .. }, Some(lgsm_path)) = (decision, &self.lgsm_path)
        else {
            return Ok(false);
        };

        tracing::info!("Restarting server: {} restart", lgsm_path);

        let mut child = Command::new(lgsm_path.as_std_path())
            .arg("restart")
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RestartError::Process {
                path: lgsm_path.clone(),
                source,
            })?;

        let status = timeout(RESTART_TIMEOUT, child.wait())
            .await
            .map_err(|_| RestartError::Timeout {
                path: lgsm_path.clone(),
                timeout: RESTART_TIMEOUT,
            })?
            .map_err(|source| RestartError::Process {
                path: lgsm_path.clone(),
                source,
            })?;

        match status.code() {
            Some(0) => Ok(true),
            code => Err(RestartError::Failed {
                path: lgsm_path.clone(),
                code: code.unwrap_or(-1),
            }),
        }
    }
}
