//! ChangeSet: the diff between the persisted index and the live tree

use super::hash::ContentHash;
use crate::error::{FilesyncError, Result};
use serde::Serialize;
use std::collections::HashSet;

/// A path that exists on disk but not in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemToCreate {
    pub path: String,
    pub hash: ContentHash,
}

/// A path whose content or location changed.
///
/// A move sets `new_path`; a content change sets `new_hash`. Both may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemToUpdate {
    pub existing_path: String,
    pub new_path: Option<String>,
    pub existing_hash: ContentHash,
    pub new_hash: Option<ContentHash>,
}

impl ItemToUpdate {
    pub fn moved(existing_path: String, new_path: String, hash: ContentHash) -> Self {
        Self {
            existing_path,
            new_path: Some(new_path),
            existing_hash: hash,
            new_hash: None,
        }
    }

    pub fn rehashed(path: String, existing_hash: ContentHash, new_hash: ContentHash) -> Self {
        Self {
            existing_path: path,
            new_path: None,
            existing_hash,
            new_hash: Some(new_hash),
        }
    }

    pub fn updates_path(&self) -> bool {
        self.new_path
            .as_deref()
            .is_some_and(|p| p != self.existing_path)
    }

    pub fn updates_hash(&self) -> bool {
        self.new_hash
            .as_ref()
            .is_some_and(|h| *h != self.existing_hash)
    }

    /// Where the item lives after the change.
    pub fn current_path(&self) -> &str {
        self.new_path.as_deref().unwrap_or(&self.existing_path)
    }
}

/// A path that is in the index but gone from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemToDelete {
    pub path: String,
}

/// Creates, updates and deletes found by one synchronization run.
///
/// A path appears in at most one item of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    items_to_create: Vec<ItemToCreate>,
    items_to_update: Vec<ItemToUpdate>,
    items_to_delete: Vec<ItemToDelete>,
}

impl ChangeSet {
    /// Assemble a change set, rejecting any path that is claimed twice.
    pub fn new(
        items_to_create: Vec<ItemToCreate>,
        items_to_update: Vec<ItemToUpdate>,
        items_to_delete: Vec<ItemToDelete>,
    ) -> Result<Self> {
        let mut seen: HashSet<&str> = HashSet::new();
        let claimed = items_to_create
            .iter()
            .map(|c| c.path.as_str())
            .chain(items_to_update.iter().flat_map(|u| {
                std::iter::once(u.existing_path.as_str())
                    .chain(u.new_path.as_deref().filter(|p| *p != u.existing_path))
            }))
            .chain(items_to_delete.iter().map(|d| d.path.as_str()));
        for path in claimed {
            if !seen.insert(path) {
                return Err(FilesyncError::DiffInput(format!(
                    "path '{}' appears more than once in change set",
                    path
                )));
            }
        }

        Ok(Self {
            items_to_create,
            items_to_update,
            items_to_delete,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items_to_create(&self) -> &[ItemToCreate] {
        &self.items_to_create
    }

    pub fn items_to_update(&self) -> &[ItemToUpdate] {
        &self.items_to_update
    }

    pub fn items_to_delete(&self) -> &[ItemToDelete] {
        &self.items_to_delete
    }

    pub fn is_empty(&self) -> bool {
        self.items_to_create.is_empty()
            && self.items_to_update.is_empty()
            && self.items_to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items_to_create.len() + self.items_to_update.len() + self.items_to_delete.len()
    }

    /// Paths to notify about: creates, then updates at their current path.
    ///
    /// Deletes are reported but never notified.
    pub fn notifiable_paths(&self) -> Vec<&str> {
        self.items_to_create
            .iter()
            .map(|c| c.path.as_str())
            .chain(self.items_to_update.iter().map(ItemToUpdate::current_path))
            .collect()
    }
}
