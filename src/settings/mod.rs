//! Persisted application settings.
//!
//! [`SettingsStore`] owns the in-memory [`AppSettings`] record and its JSON
//! file. Every mutation rewrites the whole file through a temporary sibling
//! and an atomic rename, so readers only ever observe a complete record.

mod persist;
mod store;
mod types;

use std::path::PathBuf;

use thiserror::Error;

use crate::app_dirs;

pub use store::SettingsStore;
pub use types::{AppSettings, ThemeMode};

/// Filename of the settings record inside the app directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Errors raised by settings validation and persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No model root has been chosen yet.
    #[error("No model folder is configured")]
    NotConfigured,
    /// The configured model root is not an existing directory.
    #[error("Model folder {path} does not exist")]
    NotFound {
        /// Configured path that is missing.
        path: PathBuf,
    },
    /// The application directory could not be resolved.
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
    /// Reading the settings file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The settings file is not a well-formed record.
    #[error("Invalid settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Encoding the record failed.
    #[error("Failed to serialize settings for {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Writing or renaming the settings file failed.
    #[error("Failed to write {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}
