use crate::models::{ModSet, WorkshopId};
use crate::services::symlink;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerConfigError {
    #[error("config {0} does not exist")]
    UnknownConfig(Utf8PathBuf),

    #[error("config name {0:?} is not a plain file name")]
    InvalidName(String),

    #[error("no mods= line found in {0}")]
    NoModsLine(Utf8PathBuf),

    #[error("mod folder {path} does not link to a workshop item")]
    UnresolvedMod { path: Utf8PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Utf8Path) -> impl FnOnce(io::Error) -> ServerConfigError + '_ {
    move |source| ServerConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Point the live server config at `<config_folder>/<name>`.
///
/// Whatever currently sits at `config_file` (a previous link or a plain
/// file) is replaced.
///
/// # Returns
/// The activated config path
pub fn activate_config(
    config_folder: &Utf8Path,
    config_file: &Utf8Path,
    name: &str,
) -> Result<Utf8PathBuf, ServerConfigError> {
    if Utf8Path::new(name).file_name() != Some(name) {
        return Err(ServerConfigError::InvalidName(name.to_string()));
    }

    let target = config_folder.join(name);
    if !target.is_file() {
        return Err(ServerConfigError::UnknownConfig(target));
    }

    if symlink::occupied(config_file) {
        tracing::debug!("Replacing existing server config at {}", config_file);
        symlink::remove(config_file).map_err(io_err(config_file))?;
    } else if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    symlink::create(&target, config_file).map_err(io_err(config_file))?;
    tracing::info!("Activated server config {} -> {}", config_file, target);

    Ok(target)
}

/// The modlist a server config currently loads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveModlist {
    /// Text of the `#` comment directly above the `mods=` line
    pub title: Option<String>,
    pub mods: ModSet,
}

impl ActiveModlist {
    /// `ops_night.html` for a title of "Ops Night", `modlist.html` without one
    pub fn preset_file_name(&self) -> String {
        match &self.title {
            Some(title) => format!("{}.html", title.replace(' ', "_").to_lowercase()),
            None => "modlist.html".to_string(),
        }
    }
}

/// Parse the `mods=` line of a LinuxGSM server config.
///
/// ```text
/// # Ops Night
/// mods="mods/@cba_a3\;mods/@ace\;"
/// ```
///
/// # Returns
/// The optional title and the mod folder names in load order
pub fn parse_mods_line(contents: &str) -> Option<(Option<String>, Vec<String>)> {
    let mut prev_line: Option<&str> = None;
    let mut found = None;

    for line in contents.lines() {
        if let Some(value) = line.trim_start().strip_prefix("mods=") {
            let title = prev_line
                .map(str::trim)
                .filter(|prev| prev.starts_with('#'))
                .map(|prev| prev.trim_start_matches('#').trim().to_string())
                .filter(|title| !title.is_empty());
            found = Some((title, value.to_string()));
        }
        prev_line = Some(line);
    }

    let (title, value) = found?;
    let mods = value
        .replace(['"', '\\'], "")
        .split(';')
        .map(|entry| entry.trim().trim_start_matches("mods/").to_string())
        .filter(|entry| !entry.is_empty())
        .collect();

    Some((title, mods))
}

/// Read the modlist of the active server config, resolving each mod folder
/// through its symlink in `mods_dir` to the Workshop id.
pub fn read_active_modlist(
    config_file: &Utf8Path,
    mods_dir: &Utf8Path,
) -> Result<ActiveModlist, ServerConfigError> {
    let contents = fs::read_to_string(config_file).map_err(io_err(config_file))?;
    let (title, names) = parse_mods_line(&contents)
        .ok_or_else(|| ServerConfigError::NoModsLine(config_file.to_path_buf()))?;

    let mut mods = ModSet::new();
    for name in names {
        let link = mods_dir.join(&name);
        let target = fs::read_link(&link).map_err(io_err(&link))?;
        let id = target
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(|f| f.parse::<WorkshopId>().ok())
            .ok_or_else(|| ServerConfigError::UnresolvedMod { path: link.clone() })?;
        mods.insert(name, id);
    }

    tracing::info!(
        "Active server config {} loads {} mods",
        config_file,
        mods.len()
    );

    Ok(ActiveModlist { title, mods })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mods_line_with_title() {
        let contents = "hostname=\"x\"\n# Ops Night\nmods=\"mods/@cba_a3\\;mods/@ace\\;\"\n";
        let (title, mods) = parse_mods_line(contents).unwrap();
        assert_eq!(title.as_deref(), Some("Ops Night"));
        assert_eq!(mods, vec!["@cba_a3", "@ace"]);
    }

    #[test]
    fn test_parse_mods_line_without_title() {
        let contents = "mods=\"mods/@cba_a3;\"\n";
        let (title, mods) = parse_mods_line(contents).unwrap();
        assert!(title.is_none());
        assert_eq!(mods, vec!["@cba_a3"]);
    }

    #[test]
    fn test_parse_mods_line_missing() {
        assert!(parse_mods_line("servermods=\"\"\n").is_none());
    }

    #[test]
    fn test_preset_file_name() {
        let modlist = ActiveModlist {
            title: Some("Ops Night".to_string()),
            mods: ModSet::new(),
        };
        assert_eq!(modlist.preset_file_name(), "ops_night.html");
        assert_eq!(ActiveModlist::default().preset_file_name(), "modlist.html");
    }
}
