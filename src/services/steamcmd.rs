use crate::models::{UserCredentials, WorkshopId};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Parameters for one Workshop download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub credentials: UserCredentials,
    pub app_id: u32,
    pub mod_id: WorkshopId,
    /// Ask the tool to verify existing files
    pub validate: bool,
}

/// Errors that can occur while invoking the download tool
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("download tool not available at {path}: {source}")]
    ToolUnavailable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("process error: {0}")]
    Process(#[from] io::Error),
}

impl DownloadError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, DownloadError::ToolUnavailable { .. })
    }
}

/// Something that can fetch a Workshop item onto disk.
///
/// Success is judged by the caller looking for the item's directory, not by
/// the return value: steamcmd happily exits 0 after a failed download.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Run one download attempt, returning the tool's exit code
    async fn download(&self, request: &DownloadRequest) -> Result<i32, DownloadError>;
}

/// Downloader backed by the steamcmd executable
#[derive(Debug, Clone)]
pub struct SteamCmd {
    executable: Utf8PathBuf,
    timeout: Duration,
}

impl SteamCmd {
    pub fn new(executable: impl Into<Utf8PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    pub fn executable(&self) -> &Utf8Path {
        &self.executable
    }

    /// Build the steamcmd argument list for a request
    ///
    /// `+login <user> <pass> +workshop_download_item <app> <id> [validate] +quit`
    pub fn build_args(request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "+login".to_string(),
            request.credentials.username.clone(),
            request.credentials.password.clone(),
            "+workshop_download_item".to_string(),
            request.app_id.to_string(),
            request.mod_id.to_string(),
        ];
        if request.validate {
            args.push("validate".to_string());
        }
        args.push("+quit".to_string());
        args
    }

    /// The command line as it may appear in logs
    pub fn describe(&self, request: &DownloadRequest) -> String {
        let args: Vec<String> = Self::build_args(request)
            .into_iter()
            .map(|arg| {
                if !request.credentials.password.is_empty()
                    && arg == request.credentials.password
                {
                    "********".to_string()
                } else {
                    arg
                }
            })
            .collect();
        format!("{} {}", self.executable, args.join(" "))
    }
}

#[async_trait]
impl Downloader for SteamCmd {
    async fn download(&self, request: &DownloadRequest) -> Result<i32, DownloadError> {
        tracing::info!("Executing: {}", self.describe(request));

        let start = Instant::now();

        let mut cmd = Command::new(self.executable.as_std_path());
        cmd.args(Self::build_args(request)).kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                DownloadError::ToolUnavailable {
                    path: self.executable.clone(),
                    source: e,
                }
            }
            _ => DownloadError::Process(e),
        })?;

        let status = timeout(self.timeout, child.wait())
            .await
            .map_err(|_| {
                tracing::warn!("steamcmd timed out after {:?}", self.timeout);
                DownloadError::Timeout(self.timeout)
            })??;

        let exit_code = status.code().unwrap_or(-1);

        tracing::info!(
            "steamcmd completed in {:.2}s with exit code {}",
            start.elapsed().as_secs_f32(),
            exit_code
        );

        Ok(exit_code)
    }
}
