//! Live tree scanner
//!
//! Walks the upload directory with `walkdir`, hashes every file with BLAKE3 and
//! derives directory hashes bottom-up from their children. The resulting
//! [`PathIndex`] is the atomic "live" input of a synchronization run.

use super::hash::ContentHash;
use super::path_index::{PathEntry, PathIndex};
use crate::config::ScanSettings;
use crate::error::{FilesyncError, Result};
use crate::paths;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Marker file that excludes its directory (and everything below) from the index.
pub const NOSYNC_MARKER: &str = ".nosync";

pub struct LiveScanner {
    project_root: PathBuf,
    upload_path: String,
    settings: ScanSettings,
}

impl LiveScanner {
    pub fn new(project_root: impl Into<PathBuf>, upload_path: impl Into<String>) -> Self {
        Self::with_settings(project_root, upload_path, ScanSettings::default())
    }

    pub fn with_settings(
        project_root: impl Into<PathBuf>,
        upload_path: impl Into<String>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            upload_path: upload_path.into(),
            settings,
        }
    }

    pub fn upload_path(&self) -> &str {
        &self.upload_path
    }

    /// Resolve requested sync roots against the upload path.
    ///
    /// No roots means the whole upload directory. Every root must lie inside it.
    pub fn resolve_roots(&self, roots: &[String]) -> Result<Vec<String>> {
        if roots.is_empty() {
            return Ok(vec![self.upload_path.clone()]);
        }
        roots
            .iter()
            .map(|root| {
                let normalized = paths::normalize(root).map_err(FilesyncError::DiffInput)?;
                let normalized = normalized.trim_start_matches('/').to_string();
                if !paths::is_within(&normalized, &self.upload_path) {
                    return Err(FilesyncError::DiffInput(format!(
                        "'{}' is outside of the upload directory '{}'",
                        root, self.upload_path
                    )));
                }
                Ok(normalized)
            })
            .collect()
    }

    /// Capture a snapshot of everything inside `roots` (already resolved).
    pub fn scan(&self, roots: &[String]) -> Result<PathIndex> {
        let start = Instant::now();
        let mut index = PathIndex::new();

        for root in roots {
            let include_self = paths::segments(root) != paths::segments(&self.upload_path);
            for entry in self.scan_root(root, include_self)? {
                if !index.contains(&entry.path) {
                    index.insert(entry)?;
                }
            }
        }

        info!(
            entries = index.len(),
            files = index.file_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Captured live snapshot"
        );
        Ok(index)
    }

    fn scan_root(&self, root: &str, include_self: bool) -> Result<Vec<PathEntry>> {
        let fs_root = self.project_root.join(root);
        if !fs_root.exists() {
            debug!(root = %root, "Sync root does not exist on disk");
            return Ok(Vec::new());
        }
        if !fs_root.is_dir() {
            let hash = ContentHash::of_file(&fs_root)?;
            return Ok(vec![PathEntry::file(root, hash)]);
        }

        // path -> file hash, None for directories
        let mut found: BTreeMap<String, Option<ContentHash>> = BTreeMap::new();
        let settings = &self.settings;
        let walker = WalkDir::new(&fs_root)
            .min_depth(if include_self { 0 } else { 1 })
            .follow_links(settings.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| keep_entry(entry, settings));

        for entry in walker {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(&self.project_root)
                .map_err(|e| FilesyncError::DiffInput(e.to_string()))?;
            let rel = paths::to_index_path(rel);

            if entry.file_type().is_dir() {
                found.insert(rel, None);
            } else if entry.file_type().is_file() {
                found.insert(rel, Some(ContentHash::of_file(entry.path())?));
            }
        }

        Ok(derive_directory_hashes(found))
    }
}

fn keep_entry(entry: &walkdir::DirEntry, settings: &ScanSettings) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if name == NOSYNC_MARKER {
        return false;
    }
    if !settings.include_hidden && name.starts_with('.') {
        return false;
    }
    if entry.file_type().is_dir() {
        if settings.exclude_dir_names.iter().any(|excluded| excluded.as_str() == name.as_ref()) {
            return false;
        }
        if entry.path().join(NOSYNC_MARKER).exists() {
            debug!(path = %entry.path().display(), "Skipping .nosync directory");
            return false;
        }
    }
    true
}

/// Fill in directory hashes, deepest directories first.
fn derive_directory_hashes(found: BTreeMap<String, Option<ContentHash>>) -> Vec<PathEntry> {
    // parent -> (name, path) of its direct children
    let mut children_of: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for path in found.keys() {
        if let Some((parent, name)) = path.rsplit_once('/') {
            children_of.entry(parent).or_default().push((name, path.as_str()));
        }
    }

    let mut dirs: Vec<&str> = found
        .iter()
        .filter(|(_, hash)| hash.is_none())
        .map(|(path, _)| path.as_str())
        .collect();
    dirs.sort_by_key(|path| std::cmp::Reverse(paths::segments(path).len()));

    let mut dir_hashes: BTreeMap<&str, ContentHash> = BTreeMap::new();
    for dir in dirs {
        let children: Vec<_> = children_of
            .get(dir)
            .into_iter()
            .flatten()
            .filter_map(|&(name, path)| match found.get(path)? {
                Some(hash) => Some((name, hash, false)),
                None => dir_hashes.get(path).map(|hash| (name, hash, true)),
            })
            .collect();
        let hash = ContentHash::of_directory(children);
        dir_hashes.insert(dir, hash);
    }

    found
        .iter()
        .map(|(path, file_hash)| match file_hash {
            Some(hash) => PathEntry::file(path.clone(), hash.clone()),
            None => PathEntry::directory(
                path.clone(),
                dir_hashes
                    .get(path.as_str())
                    .cloned()
                    .unwrap_or_else(|| ContentHash::of_directory(Vec::new())),
            ),
        })
        .collect()
}
