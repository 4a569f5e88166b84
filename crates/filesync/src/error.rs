//! Error types for filesync

use std::io;
use thiserror::Error;

/// Filesync error type
#[derive(Error, Debug)]
pub enum FilesyncError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Malformed or unreadable snapshot. Aborts the run before any delivery.
    #[error("Invalid snapshot: {0}")]
    DiffInput(String),

    /// Home directory reference that the directory could not resolve.
    #[error("Home directory reference '{reference}' of user {user} could not be resolved")]
    OwnershipLookup { user: String, reference: String },

    #[error("No form for \"{group}\" found - skipping")]
    TemplateMissing { group: String },

    #[error("Recipient \"{recipient}\" excluded: {reason}")]
    RecipientExcluded { recipient: String, reason: String },

    #[error("Invalid group membership '{raw}': {message}")]
    Membership { raw: String, message: String },

    #[error("Directory error: {0}")]
    Directory(String),
}

impl FilesyncError {
    /// Whether this error must abort a synchronization run.
    ///
    /// Only failures while reading or diffing snapshots are fatal; routing and
    /// delivery problems are recovered per group or per recipient.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Walk(_) | Self::Json(_) | Self::Config(_) | Self::DiffInput(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FilesyncError>;
