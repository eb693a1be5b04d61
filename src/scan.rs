//! Image discovery in the test directory.
//!
//! A suite runs over the image files found at the top level of one directory.
//! Discovery is by extension only; payloads are not opened here. Whether a
//! file is *also* present in the testset description is decided later, per
//! case, so a stray image produces a failed case instead of a skipped one.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// File extensions treated as image payloads during a scan.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff", "tif"];

/// True when the path's extension marks it as an image file.
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Collect image files from the top level of a test directory.
///
/// Subdirectories and non-image entries are skipped. The result is sorted by
/// path so suite order is stable across runs and filesystems. An empty result
/// is legal but logged, since it usually means a misconfigured path.
pub fn scan_image_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(Error::Scan(format!("Path does not exist: {}", dir.display())));
    }
    if !dir.is_dir() {
        return Err(Error::Scan(format!("Path is not a directory: {}", dir.display())));
    }

    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Scan(format!("Failed to read directory {}: {}", dir.display(), e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Scan(format!("Failed to read entry in {}: {}", dir.display(), e))
        })?;
        let path = entry.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        } else {
            debug!(path = %path.display(), "skipping non-image entry");
        }
    }

    files.sort();
    if files.is_empty() {
        warn!(dir = %dir.display(), "no image files found in test directory");
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_image_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cat.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b.PNG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("testset.json"), b"{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.png"), b"x").unwrap();

        let files = scan_image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b.PNG", "cat.jpg"]);
    }

    #[test]
    fn empty_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let files = scan_image_files(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_path_is_a_scan_error() {
        let err = scan_image_files("/nonexistent/testdir").unwrap_err();
        assert!(matches!(err, Error::Scan(_)));
    }

    #[test]
    fn file_path_is_a_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cat.jpg");
        fs::write(&file, b"x").unwrap();
        let err = scan_image_files(&file).unwrap_err();
        assert!(matches!(err, Error::Scan(_)));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_image_file(Path::new("a.JPEG")));
        assert!(is_image_file(Path::new("a.webp")));
        assert!(!is_image_file(Path::new("a.json")));
        assert!(!is_image_file(Path::new("noextension")));
    }
}
