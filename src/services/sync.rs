use crate::models::{
    ModResult, ModSet, ModStatus, ServerConfig, SyncReport, SyncStep, UserCredentials, WorkshopId,
};
use crate::services::steamcmd::{DownloadError, DownloadRequest, Downloader};
use crate::services::symlink;
use crate::services::workshop::{WorkshopClient, WorkshopError};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that can occur while synchronizing a single mod
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("changelog lookup failed: {0}")]
    Workshop(#[from] WorkshopError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("still missing after {attempts} download attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("renaming {from} to {to} would overwrite an existing entry")]
    CasingCollision { from: Utf8PathBuf, to: Utf8PathBuf },

    #[error("{0} exists and is not a symlink")]
    NotASymlink(Utf8PathBuf),

    #[error("mod name {0:?} is not a plain folder name")]
    InvalidModName(String),
}

impl SyncError {
    /// How this error is classified in a [`SyncReport`]
    pub fn status(&self) -> ModStatus {
        match self {
            SyncError::Workshop(_) | SyncError::RetriesExhausted { .. } => {
                ModStatus::TransientFailure
            }
            SyncError::Download(e) if e.is_transient() => ModStatus::TransientFailure,
            _ => ModStatus::PermanentFailure,
        }
    }
}

fn io_err(path: &Utf8Path) -> impl FnOnce(io::Error) -> SyncError + '_ {
    move |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn failure(subject: impl Into<String>, step: SyncStep, err: &SyncError) -> ModResult {
    let subject = subject.into();
    tracing::warn!("!! {} failed for {}: {} !!", step, subject, err);
    ModResult::new(subject, step, err.status(), err.to_string())
}

/// Bounded retry policy for downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after a failed attempt, giving the operator a window to interrupt
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Everything the synchronizer needs to know about the server layout
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// `workshop/content/<app id>`, one folder per Workshop id
    pub workshop_root: Utf8PathBuf,
    /// Server `mods` directory, one symlink per mod name
    pub mods_dir: Utf8PathBuf,
    /// Server `keys` directory, one symlink per signing key
    pub keys_dir: Utf8PathBuf,
    pub app_id: u32,
    pub credentials: UserCredentials,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            workshop_root: config.workshop_root(),
            mods_dir: config.mods_dir(),
            keys_dir: config.keys_dir(),
            app_id: config.arma3_workshop_id,
            credentials: config.user.clone(),
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                delay: config.retry_delay(),
            },
        }
    }
}

/// Freshness of a downloaded Workshop folder against its changelog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Current,
    Stale,
    Unknown,
}

/// Keeps the Workshop downloads and the server's mod and key links in step
/// with a [`ModSet`].
///
/// The four operations are independent idempotent passes. [`run`](Self::run)
/// executes them in the required order: update, casing, mod links, key links.
/// None of them aborts on a per-mod problem; every mod is attempted and the
/// outcome recorded as a [`ModResult`].
///
/// Not safe to run concurrently against the same workshop root.
pub struct ModSynchronizer {
    settings: SyncSettings,
    downloader: Arc<dyn Downloader>,
    workshop: Arc<dyn WorkshopClient>,

    /// Matches key files or folders inside a mod: anything with "key" in its name
    key_pattern: Regex,
}

impl ModSynchronizer {
    pub fn new(
        settings: SyncSettings,
        downloader: Arc<dyn Downloader>,
        workshop: Arc<dyn WorkshopClient>,
    ) -> Self {
        Self {
            settings,
            downloader,
            workshop,
            key_pattern: Regex::new(r"(?i)key").expect("Invalid key regex"),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Workshop folder for a mod id
    pub fn entry_path(&self, id: WorkshopId) -> Utf8PathBuf {
        self.settings.workshop_root.join(id.to_string())
    }

    /// Run a full synchronization pass
    pub async fn run(&self, mods: &ModSet, server_mods: &IndexSet<String>) -> SyncReport {
        let mut report = SyncReport::new();

        tracing::info!("Updating {} mods", mods.len());
        report.extend(self.update_mods(mods).await);

        tracing::info!("Converting uppercase files/folders to lowercase");
        report.extend(self.normalize_casing());

        tracing::info!("Creating mod symlinks");
        report.extend(self.reconcile_mod_symlinks(mods));

        tracing::info!("Linking server keys");
        report.extend(self.reconcile_key_symlinks(mods, server_mods));

        tracing::info!("Synchronization finished: {}", report.summary());
        report
    }

    /// Download missing mods and re-download outdated ones, one at a time.
    pub async fn update_mods(&self, mods: &ModSet) -> Vec<ModResult> {
        let mut results = Vec::with_capacity(mods.len());

        for (name, id) in mods {
            let result = match self.update_mod(name, *id).await {
                Ok(result) => result,
                Err(e) => failure(name.as_str(), SyncStep::Update, &e),
            };
            results.push(result);
        }

        results
    }

    async fn update_mod(&self, name: &str, id: WorkshopId) -> Result<ModResult, SyncError> {
        let path = self.entry_path(id);
        let mut reason = "not downloaded yet";

        if path.is_dir() {
            match self.check_freshness(id, &path).await? {
                Freshness::Current => {
                    tracing::info!("No update required for \"{}\" ({}), skipping", name, id);
                    return Ok(ModResult::new(
                        name,
                        SyncStep::Update,
                        ModStatus::Unchanged,
                        "up to date",
                    ));
                }
                Freshness::Unknown => {
                    // Fail closed: an unreadable changelog never forces a re-download
                    tracing::warn!(
                        "No update timestamp found in the changelog of \"{}\" ({}), assuming it is current",
                        name,
                        id
                    );
                    return Ok(ModResult::new(
                        name,
                        SyncStep::Update,
                        ModStatus::Skipped,
                        "changelog has no recognisable update timestamp, assumed current",
                    ));
                }
                Freshness::Stale => {
                    tracing::info!("\"{}\" ({}) has an update, removing old download", name, id);
                    // Removing the folder is how a finished download is detected
                    fs::remove_dir_all(&path).map_err(io_err(&path))?;
                    reason = "outdated";
                }
            }
        }

        let attempts = self.download_with_retries(name, id, &path).await?;

        Ok(ModResult::new(
            name,
            SyncStep::Update,
            ModStatus::Changed,
            format!("downloaded ({}) after {} attempt(s)", reason, attempts),
        ))
    }

    async fn check_freshness(
        &self,
        id: WorkshopId,
        path: &Utf8Path,
    ) -> Result<Freshness, SyncError> {
        let Some(updated_at) = self.workshop.latest_update(id).await? else {
            return Ok(Freshness::Unknown);
        };
        let created_at = entry_timestamp(path).map_err(io_err(path))?;

        tracing::debug!(
            "Mod {}: updated_at={} created_at={}",
            id,
            updated_at,
            created_at
        );

        if updated_at >= created_at {
            Ok(Freshness::Stale)
        } else {
            Ok(Freshness::Current)
        }
    }

    async fn download_with_retries(
        &self,
        name: &str,
        id: WorkshopId,
        path: &Utf8Path,
    ) -> Result<u32, SyncError> {
        let request = DownloadRequest {
            credentials: self.settings.credentials.clone(),
            app_id: self.settings.app_id,
            mod_id: id,
            validate: true,
        };
        let retry = self.settings.retry;
        let mut attempts = 0;

        while !path.is_dir() && attempts < retry.max_attempts {
            attempts += 1;
            tracing::info!("Updating \"{}\" ({}) | {}", name, id, attempts);

            match self.downloader.download(&request).await {
                Ok(0) => {}
                Ok(code) => tracing::debug!("Download tool exited with code {}", code),
                Err(e) if e.is_transient() => {
                    tracing::warn!("Download attempt {} for \"{}\" failed: {}", attempts, name, e)
                }
                Err(e) => return Err(e.into()),
            }

            if !path.is_dir() && attempts < retry.max_attempts {
                tokio::time::sleep(retry.delay).await;
            }
        }

        if path.is_dir() {
            Ok(attempts)
        } else {
            Err(SyncError::RetriesExhausted { attempts })
        }
    }

    /// Rename everything under the workshop root to lowercase.
    ///
    /// Entries are renamed deepest first so a parent's new name never
    /// invalidates a child path that is still queued.
    pub fn normalize_casing(&self) -> Vec<ModResult> {
        let root = &self.settings.workshop_root;
        let mut results = Vec::new();

        if !root.is_dir() {
            tracing::warn!("Workshop directory {} does not exist, nothing to rename", root);
            return results;
        }

        // Collected up front: renaming inside a directory that is still being
        // listed may make the renamed entry show up a second time
        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) => entries.push(entry.into_path()),
                Err(e) => {
                    let subject = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.to_string());
                    let err = SyncError::Io {
                        path: root.clone(),
                        source: e.into(),
                    };
                    results.push(failure(subject, SyncStep::Casing, &err));
                }
            }
        }

        for path in entries {
            match lowercase_entry(&path) {
                Ok(Some(renamed)) => {
                    tracing::debug!("Renamed {} -> {}", path.display(), renamed);
                    results.push(ModResult::new(
                        renamed.as_str(),
                        SyncStep::Casing,
                        ModStatus::Changed,
                        "renamed to lowercase",
                    ));
                }
                Ok(None) => {}
                Err(e) => results.push(failure(path.display().to_string(), SyncStep::Casing, &e)),
            }
        }

        results
    }

    /// Create a symlink in the mods directory for every downloaded mod.
    ///
    /// Existing links are left alone even when they point somewhere else.
    pub fn reconcile_mod_symlinks(&self, mods: &ModSet) -> Vec<ModResult> {
        if let Err(e) = ensure_dir(&self.settings.mods_dir) {
            return vec![failure(self.settings.mods_dir.as_str(), SyncStep::ModLink, &e)];
        }

        mods.iter()
            .map(|(name, id)| {
                self.link_mod(name, *id)
                    .unwrap_or_else(|e| failure(name.as_str(), SyncStep::ModLink, &e))
            })
            .collect()
    }

    fn link_mod(&self, name: &str, id: WorkshopId) -> Result<ModResult, SyncError> {
        validate_mod_name(name)?;

        let real_path = self.entry_path(id);
        let link_path = self.settings.mods_dir.join(name);

        if !real_path.is_dir() {
            tracing::warn!("Mod '{}' does not exist! ({})", name, real_path);
            return Ok(ModResult::new(
                name,
                SyncStep::ModLink,
                ModStatus::Skipped,
                format!("workshop folder {} is missing", real_path),
            ));
        }

        if symlink::is_symlink(&link_path) {
            return Ok(ModResult::new(
                name,
                SyncStep::ModLink,
                ModStatus::Unchanged,
                "symlink already present",
            ));
        }
        if symlink::occupied(&link_path) {
            return Err(SyncError::NotASymlink(link_path));
        }

        symlink::create(&real_path, &link_path).map_err(io_err(&link_path))?;
        tracing::info!("Creating symlink '{}'", link_path);

        Ok(ModResult::new(
            name,
            SyncStep::ModLink,
            ModStatus::Changed,
            format!("linked to {}", real_path),
        ))
    }

    /// Drop dangling key links, then link the signing keys of every
    /// non-server mod into the keys directory.
    pub fn reconcile_key_symlinks(
        &self,
        mods: &ModSet,
        server_mods: &IndexSet<String>,
    ) -> Vec<ModResult> {
        let keys_dir = &self.settings.keys_dir;

        if let Err(e) = ensure_dir(keys_dir) {
            return vec![failure(keys_dir.as_str(), SyncStep::KeyLink, &e)];
        }

        let mut results = self.remove_dangling_keys();

        for (name, id) in mods {
            if server_mods.contains(name) {
                tracing::debug!("Skipping key for server mod '{}'", name);
                continue;
            }
            match self.link_keys(name, *id) {
                Ok(linked) => results.extend(linked),
                Err(e) => results.push(failure(name.as_str(), SyncStep::KeyLink, &e)),
            }
        }

        results
    }

    fn remove_dangling_keys(&self) -> Vec<ModResult> {
        let keys_dir = &self.settings.keys_dir;

        // Raw paths: a dangling link is removed whatever its name looks like
        let listing = fs::read_dir(keys_dir).and_then(|dir| {
            dir.map(|entry| entry.map(|entry| entry.path()))
                .collect::<io::Result<Vec<PathBuf>>>()
        });
        let mut entries = match listing {
            Ok(entries) => entries,
            Err(e) => {
                let err = io_err(keys_dir)(e);
                return vec![failure(keys_dir.as_str(), SyncStep::KeyLink, &err)];
            }
        };
        entries.sort();

        let mut results = Vec::new();
        for path in entries.into_iter().filter(|p| symlink::is_dangling(p)) {
            let key = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            tracing::info!("Removing outdated server key '{}'", key);

            match symlink::remove(&path) {
                Ok(()) => results.push(ModResult::new(
                    key,
                    SyncStep::KeyLink,
                    ModStatus::Changed,
                    "removed dangling key link",
                )),
                Err(source) => {
                    let err = SyncError::Io {
                        path: keys_dir.join(&key),
                        source,
                    };
                    results.push(failure(key, SyncStep::KeyLink, &err));
                }
            }
        }
        results
    }

    fn link_keys(&self, name: &str, id: WorkshopId) -> Result<Vec<ModResult>, SyncError> {
        let real_path = self.entry_path(id);

        if !real_path.is_dir() {
            tracing::warn!("Couldn't link key for mod '{}', directory doesn't exist", name);
            return Ok(vec![ModResult::new(
                name,
                SyncStep::KeyLink,
                ModStatus::Skipped,
                format!("workshop folder {} is missing", real_path),
            )]);
        }

        let Some(key_entry) = self.find_key_entry(&real_path)? else {
            tracing::warn!("!! Couldn't find key folder for mod {} !!", name);
            return Ok(vec![ModResult::new(
                name,
                SyncStep::KeyLink,
                ModStatus::Skipped,
                "key folder not found",
            )]);
        };

        // Some mods ship the key at their root instead of in a folder
        if key_entry.is_file() {
            return Ok(vec![
                self.link_key(name, &key_entry)
                    .unwrap_or_else(|e| failure(name, SyncStep::KeyLink, &e)),
            ]);
        }

        let (entries, non_utf8) = read_dir_sorted(&key_entry)?;
        let key_files: Vec<_> = entries.into_iter().filter(|p| p.is_file()).collect();

        if key_files.is_empty() && non_utf8.is_empty() {
            tracing::warn!("Key folder {} of mod {} is empty", key_entry, name);
            return Ok(vec![ModResult::new(
                name,
                SyncStep::KeyLink,
                ModStatus::Skipped,
                format!("key folder {} is empty", key_entry),
            )]);
        }

        let mut results: Vec<ModResult> = key_files
            .iter()
            .map(|key| {
                self.link_key(name, key)
                    .unwrap_or_else(|e| failure(name, SyncStep::KeyLink, &e))
            })
            .collect();
        results.extend(
            non_utf8
                .into_iter()
                .map(|path| failure(name, SyncStep::KeyLink, &SyncError::NonUtf8Path(path))),
        );
        Ok(results)
    }

    /// First entry (by name) directly inside the mod folder whose name contains "key"
    fn find_key_entry(&self, mod_dir: &Utf8Path) -> Result<Option<Utf8PathBuf>, SyncError> {
        let (entries, non_utf8) = read_dir_sorted(mod_dir)?;
        for path in &non_utf8 {
            tracing::warn!("Ignoring {}: name is not valid UTF-8", path.display());
        }

        Ok(entries.into_iter().find(|p| {
            p.file_name()
                .is_some_and(|file_name| self.key_pattern.is_match(file_name))
        }))
    }

    fn link_key(&self, name: &str, key_file: &Utf8Path) -> Result<ModResult, SyncError> {
        let key = key_file
            .file_name()
            .ok_or_else(|| SyncError::InvalidModName(key_file.to_string()))?;
        let link_path = self.settings.keys_dir.join(key);

        // Keys are identified by file name only; the first mod to claim one wins
        if symlink::occupied(&link_path) {
            return Ok(ModResult::new(
                name,
                SyncStep::KeyLink,
                ModStatus::Unchanged,
                format!("key {} already present", key),
            ));
        }

        symlink::create(key_file, &link_path).map_err(io_err(&link_path))?;
        tracing::info!("Creating symlink to key for mod '{}' ({})", name, key);

        Ok(ModResult::new(
            name,
            SyncStep::KeyLink,
            ModStatus::Changed,
            format!("linked key {}", key),
        ))
    }
}

/// Seconds since the epoch at which the folder was created (inode change time on Unix)
fn entry_timestamp(path: &Utf8Path) -> io::Result<i64> {
    let meta = fs::metadata(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(meta.ctime())
    }

    #[cfg(not(unix))]
    {
        let created = meta.created()?;
        Ok(created
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0))
    }
}

fn lowercase_entry(path: &Path) -> Result<Option<Utf8PathBuf>, SyncError> {
    let path =
        Utf8Path::from_path(path).ok_or_else(|| SyncError::NonUtf8Path(path.to_path_buf()))?;
    let Some(name) = path.file_name() else {
        return Ok(None);
    };

    let lower = name.to_lowercase();
    if lower == name {
        return Ok(None);
    }

    let target = path.with_file_name(&lower);
    if symlink::occupied(&target) {
        return Err(SyncError::CasingCollision {
            from: path.to_path_buf(),
            to: target,
        });
    }

    fs::rename(path, &target).map_err(io_err(path))?;
    Ok(Some(target))
}

fn validate_mod_name(name: &str) -> Result<(), SyncError> {
    let mut components = Utf8Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(camino::Utf8Component::Normal(_)), None) => Ok(()),
        _ => Err(SyncError::InvalidModName(name.to_string())),
    }
}

fn ensure_dir(dir: &Utf8Path) -> Result<(), SyncError> {
    if !dir.is_dir() {
        tracing::info!("Creating directory {}", dir);
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    Ok(())
}

/// Entries of `dir` sorted by name; names that are not valid UTF-8 come back separately
fn read_dir_sorted(dir: &Utf8Path) -> Result<(Vec<Utf8PathBuf>, Vec<PathBuf>), SyncError> {
    let mut entries = Vec::new();
    let mut non_utf8 = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        match Utf8PathBuf::try_from(entry.path()) {
            Ok(path) => entries.push(path),
            Err(e) => non_utf8.push(e.into_path_buf()),
        }
    }
    entries.sort();
    non_utf8.sort();
    Ok((entries, non_utf8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::steamcmd::MockDownloader;
    use crate::services::workshop::MockWorkshopClient;
    use tempfile::TempDir;

    fn settings(root: &Utf8Path) -> SyncSettings {
        SyncSettings {
            workshop_root: root.join("workshop"),
            mods_dir: root.join("mods"),
            keys_dir: root.join("keys"),
            app_id: 107410,
            credentials: UserCredentials {
                username: "steamuser".to_string(),
                password: "steampass".to_string(),
            },
            retry: RetryPolicy {
                max_attempts: 10,
                delay: Duration::ZERO,
            },
        }
    }

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, root)
    }

    fn cba() -> ModSet {
        let mut mods = ModSet::new();
        mods.insert("@cba_a3".to_string(), WorkshopId::new(450814997));
        mods
    }

    #[tokio::test]
    async fn test_current_mod_is_not_downloaded() {
        let (_temp_dir, root) = temp_root();
        let entry = root.join("workshop/450814997");
        fs::create_dir_all(&entry).unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let mut workshop = MockWorkshopClient::new();
        workshop
            .expect_latest_update()
            .times(1)
            .returning(|_| Ok(Some(0)));

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ModStatus::Unchanged);
        assert!(entry.is_dir());
    }

    #[tokio::test]
    async fn test_outdated_mod_is_redownloaded() {
        let (_temp_dir, root) = temp_root();
        let entry = root.join("workshop/450814997");
        fs::create_dir_all(&entry).unwrap();
        fs::write(entry.join("old.pbo"), b"old").unwrap();

        let mut workshop = MockWorkshopClient::new();
        workshop
            .expect_latest_update()
            .returning(|_| Ok(Some(i64::MAX)));

        let download_target = entry.clone();
        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(1).returning(move |req| {
            assert_eq!(req.mod_id, WorkshopId::new(450814997));
            assert!(req.validate);
            fs::create_dir_all(&download_target).unwrap();
            Ok(0)
        });

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results[0].status, ModStatus::Changed);
        assert!(entry.is_dir());
        assert!(!entry.join("old.pbo").exists());
    }

    #[tokio::test]
    async fn test_unreadable_changelog_keeps_existing_download() {
        let (_temp_dir, root) = temp_root();
        let entry = root.join("workshop/450814997");
        fs::create_dir_all(&entry).unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let mut workshop = MockWorkshopClient::new();
        workshop.expect_latest_update().returning(|_| Ok(None));

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results[0].status, ModStatus::Skipped);
        assert!(entry.is_dir());
    }

    #[tokio::test]
    async fn test_changelog_fetch_error_is_transient() {
        let (_temp_dir, root) = temp_root();
        let entry = root.join("workshop/450814997");
        fs::create_dir_all(&entry).unwrap();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let mut workshop = MockWorkshopClient::new();
        workshop.expect_latest_update().returning(|_| {
            Err(WorkshopError::Status {
                url: "https://example.invalid".to_string(),
                status: 503,
            })
        });

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results[0].status, ModStatus::TransientFailure);
        assert!(entry.is_dir());
    }

    #[tokio::test]
    async fn test_download_retries_are_bounded() {
        let (_temp_dir, root) = temp_root();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(10).returning(|_| Ok(0));
        let mut workshop = MockWorkshopClient::new();
        workshop.expect_latest_update().times(0);

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject, "@cba_a3");
        assert_eq!(results[0].status, ModStatus::TransientFailure);
        assert!(results[0].message.contains("10"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_pauses_between_attempts_only() {
        let (_temp_dir, root) = temp_root();
        let mut settings = settings(&root);
        settings.retry.delay = Duration::from_secs(5);

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(10).returning(|_| Ok(0));

        let sync = ModSynchronizer::new(
            settings,
            Arc::new(downloader),
            Arc::new(MockWorkshopClient::new()),
        );

        let start = tokio::time::Instant::now();
        let results = sync.update_mods(&cba()).await;

        // Nine pauses for ten attempts, none after the last one
        assert_eq!(start.elapsed(), Duration::from_secs(45));
        assert_eq!(results[0].status, ModStatus::TransientFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_once_folder_appears() {
        let (_temp_dir, root) = temp_root();
        let mut settings = settings(&root);
        settings.retry.delay = Duration::from_secs(5);

        let entry = root.join("workshop/450814997");
        let mut calls = 0;
        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(3).returning(move |_| {
            calls += 1;
            if calls == 3 {
                fs::create_dir_all(&entry).unwrap();
            }
            Ok(0)
        });

        let sync = ModSynchronizer::new(
            settings,
            Arc::new(downloader),
            Arc::new(MockWorkshopClient::new()),
        );

        let start = tokio::time::Instant::now();
        let results = sync.update_mods(&cba()).await;

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(results[0].status, ModStatus::Changed);
        assert!(results[0].message.contains("3 attempt"));
    }

    #[tokio::test]
    async fn test_missing_download_tool_stops_retrying() {
        let (_temp_dir, root) = temp_root();

        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(1).returning(|_| {
            Err(DownloadError::ToolUnavailable {
                path: Utf8PathBuf::from("/usr/games/steamcmd"),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
        });
        let workshop = MockWorkshopClient::new();

        let sync = ModSynchronizer::new(settings(&root), Arc::new(downloader), Arc::new(workshop));
        let results = sync.update_mods(&cba()).await;

        assert_eq!(results[0].status, ModStatus::PermanentFailure);
    }

    #[test]
    fn test_validate_mod_name() {
        assert!(validate_mod_name("@cba_a3").is_ok());
        assert!(validate_mod_name("../escape").is_err());
        assert!(validate_mod_name("a/b").is_err());
        assert!(validate_mod_name("").is_err());
    }

    #[test]
    fn test_key_pattern_is_case_insensitive() {
        let sync = ModSynchronizer::new(
            settings(Utf8Path::new("/tmp")),
            Arc::new(MockDownloader::new()),
            Arc::new(MockWorkshopClient::new()),
        );
        assert!(sync.key_pattern.is_match("Keys"));
        assert!(sync.key_pattern.is_match("servermod.bikey"));
        assert!(sync.key_pattern.is_match("SERVERKEY"));
        assert!(!sync.key_pattern.is_match("addons"));
    }

    #[test]
    fn test_sync_error_classification() {
        assert_eq!(
            SyncError::RetriesExhausted { attempts: 10 }.status(),
            ModStatus::TransientFailure
        );
        assert_eq!(
            SyncError::NotASymlink(Utf8PathBuf::from("/x")).status(),
            ModStatus::PermanentFailure
        );
        assert_eq!(
            SyncError::Download(DownloadError::Timeout(Duration::from_secs(1))).status(),
            ModStatus::TransientFailure
        );
    }
}
