use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{Result, ViewerError};

pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Extension match is case-insensitive: `jpg` accepts `JPG` and `Jpg` too.
pub fn is_photo_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// List `dir` and return the photo filenames (basenames only), sorted.
///
/// Sub-directories and non-UTF-8 names are skipped. The result does not
/// depend on the order in which the filesystem hands back entries.
pub fn scan_dir(dir: &Path, extensions: &[String]) -> Result<Vec<String>> {
    let start = Instant::now();
    let entries = fs::read_dir(dir).map_err(|source| ViewerError::DirectoryAccess {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(ft) = entry.file_type() else { continue };
        let p = entry.path();
        // Symlinked photos are fine as long as they point at a file.
        if ft.is_dir() || !p.is_file() {
            continue;
        }
        if !is_photo_file(&p, extensions) {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    log::info!(
        "Listed {:?} in {:.2}s: {} photos",
        dir,
        start.elapsed().as_secs_f64(),
        names.len()
    );
    Ok(names)
}

/// Turn a command-line argument into `(directory, start_file)`.
pub fn resolve_target(arg: &Path) -> Result<(PathBuf, Option<String>)> {
    if arg.is_dir() {
        return Ok((arg.to_path_buf(), None));
    }
    if arg.is_file() {
        let dir = match arg.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = arg
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned);
        return Ok((dir, name));
    }
    Err(ViewerError::NotFound {
        path: arg.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        for name in ["d.JPG", "c.png", "b.jpeg", "a.jpg"] {
            touch(tmp.path(), name);
        }
        let names = scan_dir(tmp.path(), &exts()).unwrap();
        assert_eq!(names, vec!["a.jpg", "b.jpeg", "d.JPG"]);
    }

    #[test]
    fn scan_accepts_every_case_variant() {
        let tmp = TempDir::new().unwrap();
        for name in ["1.jpg", "2.JPG", "3.jpeg", "4.JPEG", "5.txt", "noext"] {
            touch(tmp.path(), name);
        }
        let names = scan_dir(tmp.path(), &exts()).unwrap();
        assert_eq!(names, vec!["1.jpg", "2.JPG", "3.jpeg", "4.JPEG"]);
    }

    #[test]
    fn scan_skips_directories_with_photo_names() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("album.jpg")).unwrap();
        touch(tmp.path(), "x.jpg");
        assert_eq!(scan_dir(tmp.path(), &exts()).unwrap(), vec!["x.jpg"]);
    }

    #[test]
    fn scan_of_missing_dir_is_access_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan_dir(&tmp.path().join("nope"), &exts()).unwrap_err();
        assert!(matches!(err, ViewerError::DirectoryAccess { .. }));
    }

    #[test]
    fn scan_of_a_file_is_access_error() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.jpg");
        let err = scan_dir(&tmp.path().join("a.jpg"), &exts()).unwrap_err();
        assert!(matches!(err, ViewerError::DirectoryAccess { .. }));
    }

    #[test]
    fn resolve_file_and_dir_targets() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.jpg");

        let (dir, start) = resolve_target(tmp.path()).unwrap();
        assert_eq!(dir, tmp.path());
        assert_eq!(start, None);

        let (dir, start) = resolve_target(&tmp.path().join("a.jpg")).unwrap();
        assert_eq!(dir, tmp.path());
        assert_eq!(start.as_deref(), Some("a.jpg"));

        let err = resolve_target(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ViewerError::NotFound { .. }));
    }
}
