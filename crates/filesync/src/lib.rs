//! Filesync - DBAFS reconciliation and change notification
//!
//! Filesync keeps a persisted index of the upload directory in step with the
//! files on disk and tells the owners of changed files about them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    DBAFS    │     │  Ownership  │     │   Router    │     │  Delivery   │
//! │ (index vs.  │────▶│ (home dirs, │────▶│ (recipient  │────▶│ (template → │
//! │  live tree) │     │   groups)   │     │  → files)   │     │  transport) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **ChangeSet**: creates, updates (content or path) and deletes of one run
//! - **Owner**: the user whose home directory holds a file, else every group
//!   named in its path
//! - **RoutingEntry**: one recipient, the files to announce and the template
//! - **Template**: an email form whose body contains `[[files]]`

pub mod cancel;
pub mod config;
pub mod dbafs;
pub mod directory;
pub mod error;
pub mod notify;
pub mod paths;
pub mod report;
pub mod sync;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use config::{FilesyncConfig, NotifySettings, ScanSettings};
pub use dbafs::{
    ChangeSet, ChangeSetBuilder, ContentHash, Dbafs, ItemToCreate, ItemToDelete, ItemToUpdate,
    LiveScanner, MetadataStore, PathEntry, PathIndex,
};
pub use directory::{
    Group, GroupId, JsonDirectory, Template, TemplateStore, User, UserDirectory, UserId,
};
pub use error::{FilesyncError, Result};
pub use notify::{
    DeliveryDriver, DeliveryReport, DeliveryStatus, MailTransport, Message, NotificationRouter,
    OutboxTransport, OwnershipResolver, RoutingEntry, RoutingTable,
};
pub use sync::{Filesync, SyncOptions, SyncOutcome};
