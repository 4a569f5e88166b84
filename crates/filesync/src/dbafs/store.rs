//! Metadata store: the persisted DBAFS index file

use super::builder::ChangeSetBuilder;
use super::change_set::ChangeSet;
use super::path_index::{PathEntry, PathIndex};
use super::scanner::LiveScanner;
use crate::config::FilesyncConfig;
use crate::error::{FilesyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_VERSION: u32 = 1;

/// Reconciles persisted metadata with the tree and reports what changed.
pub trait MetadataStore: Send {
    /// Synchronize `paths` (everything when empty) and return the changes.
    fn sync(&mut self, paths: &[String]) -> Result<ChangeSet>;
}

/// On-disk layout of the index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    pub entries: Vec<PathEntry>,
}

impl IndexFile {
    fn from_index(index: &PathIndex) -> Self {
        Self {
            version: INDEX_VERSION,
            captured_at: Utc::now(),
            entries: index.iter().cloned().collect(),
        }
    }
}

/// JSON-file backed DBAFS
pub struct Dbafs {
    index_path: PathBuf,
    scanner: LiveScanner,
    builder: ChangeSetBuilder,
    dry_run: bool,
}

impl Dbafs {
    pub fn new(index_path: impl Into<PathBuf>, scanner: LiveScanner) -> Self {
        Self {
            index_path: index_path.into(),
            scanner,
            builder: ChangeSetBuilder::new(),
            dry_run: false,
        }
    }

    pub fn from_config(config: &FilesyncConfig) -> Self {
        let scanner = LiveScanner::with_settings(
            &config.project_root,
            config.upload_path.clone(),
            config.scan.clone(),
        );
        let builder = if config.scan.detect_moves {
            ChangeSetBuilder::new()
        } else {
            ChangeSetBuilder::new().without_move_detection()
        };
        Self::new(&config.index_path, scanner).with_builder(builder)
    }

    /// Compute changes without writing the index back.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_builder(mut self, builder: ChangeSetBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Load the persisted index. A missing file is an empty index.
    pub fn load_index(&self) -> Result<PathIndex> {
        if !self.index_path.exists() {
            debug!(path = %self.index_path.display(), "No persisted index yet");
            return Ok(PathIndex::new());
        }
        let content = fs::read_to_string(&self.index_path)?;
        let file: IndexFile = serde_json::from_str(&content).map_err(|e| {
            FilesyncError::DiffInput(format!(
                "cannot parse index {}: {}",
                self.index_path.display(),
                e
            ))
        })?;
        if file.version != INDEX_VERSION {
            return Err(FilesyncError::DiffInput(format!(
                "unsupported index version {} in {}",
                file.version,
                self.index_path.display()
            )));
        }
        PathIndex::from_entries(file.entries)
    }

    /// Write the index through a temporary file and rename it into place.
    pub fn save_index(&self, index: &PathIndex) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.index_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&IndexFile::from_index(index))?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }

    /// Live snapshot of `paths` (everything when empty).
    pub fn snapshot(&self, paths: &[String]) -> Result<PathIndex> {
        let roots = self.scanner.resolve_roots(paths)?;
        self.scanner.scan(&roots)
    }
}

impl MetadataStore for Dbafs {
    fn sync(&mut self, paths: &[String]) -> Result<ChangeSet> {
        let roots = self.scanner.resolve_roots(paths)?;
        let mut persisted = self.load_index()?;
        let live = self.scanner.scan(&roots)?;
        let change_set = self.builder.build_scoped(&persisted, &live, &roots)?;

        info!(
            created = change_set.items_to_create().len(),
            updated = change_set.items_to_update().len(),
            deleted = change_set.items_to_delete().len(),
            dry_run = self.dry_run,
            "Computed change set"
        );

        if self.dry_run {
            return Ok(change_set);
        }
        if !change_set.is_empty() || !self.index_path.exists() {
            persisted.replace_scope(&roots, live);
            self.save_index(&persisted)?;
            debug!(path = %self.index_path.display(), entries = persisted.len(), "Wrote index");
        }
        Ok(change_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn store(dir: &TempDir) -> Dbafs {
        Dbafs::new(
            dir.path().join("state").join("dbafs.json"),
            LiveScanner::new(dir.path(), "files"),
        )
    }

    #[test]
    fn test_first_sync_creates_everything_then_settles() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "files/groupA/doc.pdf", "pdf");
        let mut dbafs = store(&dir);

        let first = dbafs.sync(&[]).unwrap();
        let created: Vec<_> = first.items_to_create().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(created, vec!["files/groupA", "files/groupA/doc.pdf"]);
        assert!(dbafs.index_path().exists());

        assert!(dbafs.sync(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_move_is_detected_across_runs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "files/groupA/doc.pdf", "pdf");
        let mut dbafs = store(&dir);
        dbafs.sync(&[]).unwrap();

        fs::create_dir_all(dir.path().join("files/groupB")).unwrap();
        fs::rename(
            dir.path().join("files/groupA/doc.pdf"),
            dir.path().join("files/groupB/doc.pdf"),
        )
        .unwrap();

        let change_set = dbafs.sync(&[]).unwrap();
        let moved: Vec<_> = change_set
            .items_to_update()
            .iter()
            .filter(|u| u.updates_path())
            .map(|u| (u.existing_path.as_str(), u.current_path()))
            .collect();
        assert_eq!(moved, vec![("files/groupA/doc.pdf", "files/groupB/doc.pdf")]);
        let created: Vec<_> = change_set.items_to_create().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(created, vec!["files/groupB"]);
    }

    #[test]
    fn test_move_detection_can_be_disabled_in_config() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "files/groupA/doc.pdf", "pdf");
        let mut config = FilesyncConfig::default();
        config.project_root = dir.path().to_path_buf();
        config.index_path = dir.path().join("state").join("dbafs.json");
        config.scan.detect_moves = false;

        let mut dbafs = Dbafs::from_config(&config);
        dbafs.sync(&[]).unwrap();
        fs::rename(
            dir.path().join("files/groupA/doc.pdf"),
            dir.path().join("files/groupA/renamed.pdf"),
        )
        .unwrap();

        let change_set = dbafs.sync(&[]).unwrap();
        assert!(change_set.items_to_update().iter().all(|u| !u.updates_path()));
        let created: Vec<_> = change_set.items_to_create().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(created, vec!["files/groupA/renamed.pdf"]);
        let deleted: Vec<_> = change_set.items_to_delete().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(deleted, vec!["files/groupA/doc.pdf"]);
    }

    #[test]
    fn test_dry_run_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "files/a.txt", "a");
        let mut dbafs = store(&dir).with_dry_run(true);

        assert_eq!(dbafs.sync(&[]).unwrap().len(), 1);
        assert!(!dbafs.index_path().exists());
        assert_eq!(dbafs.sync(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_scoped_sync_keeps_rest_of_index() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "files/groupA/a.txt", "a");
        write(dir.path(), "files/groupB/b.txt", "b");
        let mut dbafs = store(&dir);
        dbafs.sync(&[]).unwrap();

        write(dir.path(), "files/groupA/a.txt", "a2");
        fs::remove_file(dir.path().join("files/groupB/b.txt")).unwrap();

        let scoped = dbafs.sync(&["files/groupA".to_string()]).unwrap();
        assert!(scoped.items_to_delete().is_empty());
        assert!(scoped
            .items_to_update()
            .iter()
            .any(|u| u.existing_path == "files/groupA/a.txt" && u.updates_hash()));

        let index = dbafs.load_index().unwrap();
        assert!(index.contains("files/groupB/b.txt"));

        let full = dbafs.sync(&[]).unwrap();
        let deleted: Vec<_> = full.items_to_delete().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(deleted, vec!["files/groupB/b.txt"]);
    }

    #[test]
    fn test_malformed_index_is_fatal() {
        let dir = TempDir::new().unwrap();
        let dbafs = store(&dir);
        fs::create_dir_all(dbafs.index_path().parent().unwrap()).unwrap();
        fs::write(dbafs.index_path(), "{ not json").unwrap();

        let err = dbafs.load_index().unwrap_err();
        assert!(matches!(err, FilesyncError::DiffInput(_)));
        assert!(err.is_fatal());
    }
}
