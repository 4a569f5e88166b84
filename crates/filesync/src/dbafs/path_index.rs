//! PathIndex: a point-in-time view of the synchronized tree, keyed by path

use super::hash::ContentHash;
use crate::error::{FilesyncError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One file or directory captured in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub path: String,
    pub hash: ContentHash,
    #[serde(default)]
    pub is_directory: bool,
}

impl PathEntry {
    pub fn file(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            hash,
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            hash,
            is_directory: true,
        }
    }
}

/// A snapshot of the tree. Iteration is always in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
    entries: BTreeMap<String, PathEntry>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from captured entries.
    ///
    /// Fails with [`FilesyncError::DiffInput`] on malformed or duplicate paths.
    pub fn from_entries(entries: impl IntoIterator<Item = PathEntry>) -> Result<Self> {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, mut entry: PathEntry) -> Result<()> {
        entry.path = paths::normalize(&entry.path).map_err(FilesyncError::DiffInput)?;
        if self.entries.contains_key(&entry.path) {
            return Err(FilesyncError::DiffInput(format!(
                "duplicate path '{}' in snapshot",
                entry.path
            )));
        }
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.values()
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_directory).count()
    }

    /// Entries equal to or below any of `roots`. No roots means everything.
    pub fn scoped(&self, roots: &[String]) -> PathIndex {
        if roots.is_empty() {
            return self.clone();
        }
        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| in_scope(path, roots))
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect();
        PathIndex { entries }
    }

    /// Replace everything inside `roots` with the entries of `live`.
    ///
    /// Entries outside the scope are kept untouched, so a partial sync never
    /// forgets the rest of the tree.
    pub fn replace_scope(&mut self, roots: &[String], live: PathIndex) {
        if roots.is_empty() {
            self.entries = live.entries;
            return;
        }
        self.entries.retain(|path, _| !in_scope(path, roots));
        self.entries
            .extend(live.entries.into_iter().filter(|(path, _)| in_scope(path, roots)));
    }
}

fn in_scope(path: &str, roots: &[String]) -> bool {
    roots.iter().any(|root| paths::is_within(path, root))
}
