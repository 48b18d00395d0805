//! Write-protection of a photo together with its sidecars.
//!
//! Files are related when they share the name stem, e.g. `IMG_001.JPG`,
//! `IMG_001.CR2` and `IMG_001.xmp`. Protecting one protects all of them.

use std::fs;
use std::path::Path;

use crate::error::{Result, ViewerError};

#[cfg(unix)]
const WRITE_BITS: u32 = 0o222;

/// Everything before the last dot; empty for names without one.
fn stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
}

fn access_err(path: &Path) -> impl FnOnce(std::io::Error) -> ViewerError + '_ {
    move |source| ViewerError::Protection {
        path: path.to_path_buf(),
        source,
    }
}

pub fn related_files(dir: &Path, basename: &str) -> Result<Vec<String>> {
    let wanted = stem(basename);
    let entries = fs::read_dir(dir).map_err(access_err(dir))?;
    let mut related: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| stem(name) == wanted)
        .collect();
    related.sort();
    Ok(related)
}

#[cfg(unix)]
fn is_writable(perms: &fs::Permissions) -> bool {
    use std::os::unix::fs::PermissionsExt;
    perms.mode() & WRITE_BITS != 0
}

#[cfg(not(unix))]
fn is_writable(perms: &fs::Permissions) -> bool {
    !perms.readonly()
}

#[cfg(unix)]
fn set_writable(perms: &mut fs::Permissions, writable: bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = perms.mode();
    perms.set_mode(if writable { mode | WRITE_BITS } else { mode & !WRITE_BITS });
}

#[cfg(not(unix))]
fn set_writable(perms: &mut fs::Permissions, writable: bool) {
    perms.set_readonly(!writable);
}

pub fn is_protected(dir: &Path, basename: &str) -> Result<bool> {
    let path = dir.join(basename);
    let meta = fs::metadata(&path).map_err(access_err(&path))?;
    Ok(!is_writable(&meta.permissions()))
}

fn set_protection(dir: &Path, basename: &str, protected: bool) -> Result<()> {
    for name in related_files(dir, basename)? {
        let path = dir.join(&name);
        let mut perms = fs::metadata(&path).map_err(access_err(&path))?.permissions();
        set_writable(&mut perms, !protected);
        fs::set_permissions(&path, perms).map_err(access_err(&path))?;
        log::debug!("{} {:?}", if protected { "Protected" } else { "Unprotected" }, path);
    }
    Ok(())
}

pub fn protect(dir: &Path, basename: &str) -> Result<()> {
    set_protection(dir, basename, true)
}

pub fn unprotect(dir: &Path, basename: &str) -> Result<()> {
    set_protection(dir, basename, false)
}
