//! DBAFS: the persisted index of the upload directory and its reconciliation
//! against the live tree.

pub mod builder;
pub mod change_set;
pub mod hash;
pub mod path_index;
pub mod scanner;
pub mod store;

pub use builder::ChangeSetBuilder;
pub use change_set::{ChangeSet, ItemToCreate, ItemToDelete, ItemToUpdate};
pub use hash::ContentHash;
pub use path_index::{PathEntry, PathIndex};
pub use scanner::{LiveScanner, NOSYNC_MARKER};
pub use store::{Dbafs, IndexFile, MetadataStore};
