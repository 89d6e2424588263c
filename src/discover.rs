//! Listing of the page files a configuration operates on.

use crate::safety::FORBIDDEN_DIRS;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Every file under `root` with the given extension, as `/`-separated paths
/// relative to `root`, sorted by name.
///
/// Without `recursive` only the top level of `root` is listed. Forbidden
/// directories (`node_modules`, `.git`, ...) are never entered.
pub fn discover(root: &Path, extension: &str, recursive: bool) -> Result<Vec<String>, walkdir::Error> {
    let extension = extension.trim_start_matches('.');
    let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| !is_forbidden(e)) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(relative.join("/"));
    }
    files.sort();
    Ok(files)
}

fn is_forbidden(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| FORBIDDEN_DIRS.contains(&name))
}
