//! ChangeSetBuilder: reconcile the persisted index against a live snapshot
//!
//! # Algorithm
//!
//! 1. Paths present in both snapshots with a different hash become hash updates.
//! 2. Paths that vanished are paired with paths that appeared carrying the same
//!    hash (and kind). Vanished paths are visited in path order and each takes
//!    the smallest unclaimed candidate, so ties resolve deterministically.
//! 3. Unpaired vanished paths become deletes, unpaired new paths creates.

use super::change_set::{ChangeSet, ItemToCreate, ItemToDelete, ItemToUpdate};
use super::hash::ContentHash;
use super::path_index::{PathEntry, PathIndex};
use crate::error::Result;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChangeSetBuilder {
    detect_moves: bool,
}

impl Default for ChangeSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSetBuilder {
    pub fn new() -> Self {
        Self { detect_moves: true }
    }

    /// Report every move as a delete plus a create.
    pub fn without_move_detection(mut self) -> Self {
        self.detect_moves = false;
        self
    }

    /// Diff two whole snapshots.
    pub fn build(&self, persisted: &PathIndex, live: &PathIndex) -> Result<ChangeSet> {
        let mut updates = Vec::new();
        let mut vanished: Vec<&PathEntry> = Vec::new();

        for old in persisted.iter() {
            match live.get(&old.path) {
                None => vanished.push(old),
                Some(new) if new.hash != old.hash => {
                    updates.push(ItemToUpdate::rehashed(
                        old.path.clone(),
                        old.hash.clone(),
                        new.hash.clone(),
                    ));
                }
                Some(_) => {}
            }
        }

        // (hash, kind) -> appeared paths, smallest first
        let mut appeared: HashMap<(&ContentHash, bool), BTreeSet<&str>> = HashMap::new();
        for new in live.iter().filter(|e| !persisted.contains(&e.path)) {
            appeared
                .entry((&new.hash, new.is_directory))
                .or_default()
                .insert(new.path.as_str());
        }

        let mut deletes = Vec::new();
        for old in vanished {
            let candidate = if self.detect_moves {
                appeared
                    .get_mut(&(&old.hash, old.is_directory))
                    .and_then(|candidates| candidates.pop_first())
            } else {
                None
            };

            match candidate {
                Some(new_path) => {
                    debug!(from = %old.path, to = %new_path, "Detected move");
                    updates.push(ItemToUpdate::moved(
                        old.path.clone(),
                        new_path.to_string(),
                        old.hash.clone(),
                    ));
                }
                None => deletes.push(ItemToDelete {
                    path: old.path.clone(),
                }),
            }
        }

        let mut creates: Vec<ItemToCreate> = appeared
            .into_values()
            .flatten()
            .filter_map(|path| live.get(path))
            .map(|entry| ItemToCreate {
                path: entry.path.clone(),
                hash: entry.hash.clone(),
            })
            .collect();
        creates.sort_by(|a, b| a.path.cmp(&b.path));
        updates.sort_by(|a, b| a.existing_path.cmp(&b.existing_path));

        ChangeSet::new(creates, updates, deletes)
    }

    /// Diff only the parts of both snapshots inside `roots`.
    pub fn build_scoped(
        &self,
        persisted: &PathIndex,
        live: &PathIndex,
        roots: &[String],
    ) -> Result<ChangeSet> {
        self.build(&persisted.scoped(roots), &live.scoped(roots))
    }
}
