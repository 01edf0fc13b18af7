//! Input file discovery.
//!
//! Resolves the convert command's input argument into the ordered list of
//! stack files to process. A file input passes through as-is; a directory
//! is scanned for stack extensions and the matches are sorted by path so
//! batch runs are deterministic.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Returns the stack files to process under `root`, sorted by path.
///
/// Directories are matched against `.lsm`, widened to `.tif`/`.tiff` by
/// `include_tiff`; extension matching ignores case. `recursive` controls
/// whether subdirectories are scanned. A file input skips the extension
/// filter entirely, so explicitly named files are always attempted.
pub fn discover_files(root: &Path, include_tiff: bool, recursive: bool) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_stack_file(path, include_tiff))
        .collect();
    files.sort();
    files
}

fn is_stack_file(path: &Path, include_tiff: bool) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    ext == "lsm" || (include_tiff && matches!(ext.as_str(), "tif" | "tiff"))
}
