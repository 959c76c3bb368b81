//! Discover project files and register the untracked ones.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::registry::ZoneRegistry;

/// Directory names never descended into.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".gridwrinkl",
    ".ai",
    ".tmp",
    ".venv",
    "__pycache__",
    "node_modules",
    "target",
    "dist",
    "build",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files found under the project root.
    pub discovered: usize,
    /// Files that were not tracked before and now are.
    pub registered: usize,
}

/// Walk `root` and track every file that isn't tracked yet, in `resources`.
///
/// Existing records keep their zone, feature and pin.
pub fn scan(root: &Path, registry: &ZoneRegistry) -> Result<ScanReport> {
    let mut report = ScanReport::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry));

    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(relative) = relative.to_str() else {
            tracing::warn!("Skipping non UTF-8 path {}", entry.path().display());
            continue;
        };

        report.discovered += 1;
        if registry.register_untracked(relative)? {
            tracing::debug!("Registered {}", relative);
            report.registered += 1;
        }
    }

    tracing::info!(
        "Scanned {} file(s), registered {} new",
        report.discovered,
        report.registered
    );
    Ok(report)
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}
