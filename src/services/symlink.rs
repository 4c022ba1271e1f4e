//! Symlink helpers shared by the synchronizer and config activation.

use camino::Utf8Path;
use std::fs;
use std::io;
use std::path::Path;

/// Create `link` pointing at `target`.
#[cfg(unix)]
pub fn create(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Create `link` pointing at `target`.
///
/// Windows distinguishes file and directory links; the kind is taken from the target.
#[cfg(windows)]
pub fn create(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// True if something (including a dangling symlink) occupies `path`
pub fn occupied(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub fn is_symlink(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// A symlink whose target no longer exists
pub fn is_dangling(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    is_symlink(path) && fs::metadata(path).is_err()
}

/// Remove a symlink itself, never what it points to
pub fn remove(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    #[cfg(windows)]
    if fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false) {
        return fs::remove_dir(path);
    }
    fs::remove_file(path)
}
