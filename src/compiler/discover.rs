//! Source and artifact discovery.

use std::io;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

/// Collect files under `dir` whose name ends with `.{extension}`.
///
/// Paths are relative to `dir` and sorted. Hidden entries are skipped.
/// A `dir` that is not a directory yields no files; a missing one is an error.
pub fn find_files(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    if !std::fs::metadata(dir)?.is_dir() {
        return Ok(Vec::new());
    }

    let suffix = format!(".{extension}");
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).skip_hidden(true) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(&suffix) {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        files.push(relative);
    }

    files.sort();
    Ok(files)
}
