//! Configuration for filesync

use crate::error::{FilesyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration, read from `<home>/filesync.toml` unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesyncConfig {
    /// Directory that contains the upload directory
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Synchronized root, relative to `project_root`
    #[serde(default = "default_upload_path")]
    pub upload_path: String,

    /// Persisted DBAFS index (JSON)
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Directory export with members, groups, files and forms (JSON)
    #[serde(default = "default_directory_path")]
    pub directory_path: PathBuf,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub notify: NotifySettings,
}

/// What the live scanner indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Index dotfiles and dot-directories
    #[serde(default)]
    pub include_hidden: bool,

    #[serde(default)]
    pub follow_symlinks: bool,

    /// Directory names skipped wherever they occur
    #[serde(default)]
    pub exclude_dir_names: Vec<String>,

    /// Pair vanished and new entries with equal content into moves. When off,
    /// a move shows up as a delete plus a create.
    #[serde(default = "default_true")]
    pub detect_moves: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where the outbox transport drops rendered messages
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,

    /// Upper bound on messages handed to the transport at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sender used when a template names none
    #[serde(default)]
    pub default_sender: Option<String>,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_upload_path() -> String {
    "files".to_string()
}

fn default_index_path() -> PathBuf {
    filesync_logging::filesync_home().join("dbafs.json")
}

fn default_directory_path() -> PathBuf {
    filesync_logging::filesync_home().join("directory.json")
}

fn default_outbox_dir() -> PathBuf {
    filesync_logging::filesync_home().join("outbox")
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            include_hidden: false,
            follow_symlinks: false,
            exclude_dir_names: Vec::new(),
            detect_moves: true,
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            outbox_dir: default_outbox_dir(),
            concurrency: default_concurrency(),
            default_sender: None,
        }
    }
}

impl Default for FilesyncConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            upload_path: default_upload_path(),
            index_path: default_index_path(),
            directory_path: default_directory_path(),
            scan: ScanSettings::default(),
            notify: NotifySettings::default(),
        }
    }
}

impl FilesyncConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        filesync_logging::filesync_home().join("filesync.toml")
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FilesyncConfig =
            toml::from_str(&content).map_err(|e| FilesyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| FilesyncError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        crate::paths::normalize(&self.upload_path)
            .map_err(|e| FilesyncError::Config(format!("upload_path: {}", e)))?;
        if self.notify.concurrency == 0 {
            return Err(FilesyncError::Config(
                "notify.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
