//! Model installation under the configured model folder.
//!
//! Every operation re-reads the model root from the [`SettingsStore`] and
//! stops with [`InstallError::RootNotConfigured`] when it is unset or gone.
//! The root captured at the start of an operation is used until it returns.

mod archive;
mod download;
mod job;

use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::{Arc, atomic::AtomicBool},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{http_client::HttpError, settings::SettingsStore};

pub use archive::ExtractionLimits;
pub use job::{InstallJob, InstallMessage, InstallRequest, spawn_install};

/// Errors surfaced by [`ModelInstaller`] operations.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The model folder is unset or does not exist.
    #[error("No model folder is configured, or it no longer exists")]
    RootNotConfigured,
    /// The model key is blank or is not a single folder name.
    #[error("Invalid model key '{0}'")]
    InvalidKey(String),
    /// The archive URL is blank or not http(s).
    #[error("Invalid archive URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The request failed or the body could not be read.
    #[error("Download failed: {0}")]
    Download(String),
    /// Local file I/O failed outside extraction.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The archive is not a valid zip or could not be unpacked.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
    /// The archive unpacked to nothing.
    #[error("Archive contained no files for {path}")]
    EmptyArchive { path: PathBuf },
    /// The cancel flag was raised while downloading.
    #[error("Install cancelled")]
    Cancelled,
}

impl From<HttpError> for InstallError {
    fn from(err: HttpError) -> Self {
        Self::Download(err.to_string())
    }
}

/// Downloads, unpacks and enumerates models under the configured root.
#[derive(Debug)]
pub struct ModelInstaller {
    settings: Arc<SettingsStore>,
    temp_dir: PathBuf,
    limits: ExtractionLimits,
}

impl ModelInstaller {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            temp_dir: std::env::temp_dir(),
            limits: ExtractionLimits::standard(),
        }
    }

    /// Place partial downloads in `dir` instead of the OS temp folder.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Folder a model with `key` lives in.
    pub fn model_folder(&self, key: &str) -> Result<PathBuf, InstallError> {
        let key = validate_key(key)?;
        Ok(self.root()?.join(key))
    }

    /// Whether `key` has a non-empty folder under the root.
    ///
    /// A blank key is simply not installed.
    pub fn is_model_installed(&self, key: &str) -> Result<bool, InstallError> {
        if key.trim().is_empty() {
            return Ok(false);
        }
        let folder = self.model_folder(key)?;
        Ok(dir_has_entries(&folder))
    }

    /// Names of the folders directly under the root, sorted.
    ///
    /// Enumeration failures give an empty list.
    pub fn list_installed_models(&self) -> Result<Vec<String>, InstallError> {
        let root = self.root()?;
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Could not list models in {}: {err}", root.display());
                return Ok(Vec::new());
            }
        };
        let mut models: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        models.sort();
        Ok(models)
    }

    /// Delete an installed model; `Ok(false)` when there was nothing to delete.
    pub fn remove_model(&self, key: &str) -> Result<bool, InstallError> {
        let folder = self.model_folder(key)?;
        if !folder.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&folder)?;
        info!("Removed model folder {}", folder.display());
        Ok(true)
    }

    /// Download the zip at `url` and unpack it into `<root>/<key>`.
    ///
    /// `on_progress` receives whole percentages when the server announces a
    /// length. Raising `cancel` stops the download before the existing model
    /// folder is touched. The partial download is deleted on every path.
    pub fn download_and_extract_zip<F>(
        &self,
        url: &str,
        key: &str,
        mut on_progress: F,
        cancel: &AtomicBool,
    ) -> Result<PathBuf, InstallError>
    where
        F: FnMut(u8),
    {
        let url = validate_url(url)?;
        let key = validate_key(key)?;
        let dest = self.root()?.join(&key);
        info!("Installing model '{key}' from {url}");

        let mut staged = tempfile::Builder::new()
            .prefix("modelbay-")
            .suffix(".zip.part")
            .tempfile_in(&self.temp_dir)?;
        let outcome = download::stream_to_file(&url, staged.as_file_mut(), &mut on_progress, cancel)
            .and_then(|bytes| {
                debug!("Downloaded {bytes} bytes to {}", staged.path().display());
                self.replace_with_archive(&staged, &dest)
            });
        discard_download(staged);

        match &outcome {
            Ok(path) => info!("Model '{key}' installed at {}", path.display()),
            Err(InstallError::Cancelled) => info!("Install of '{key}' cancelled"),
            Err(err) => warn!("Install of '{key}' failed: {err}"),
        }
        outcome
    }

    fn replace_with_archive(
        &self,
        staged: &NamedTempFile,
        dest: &Path,
    ) -> Result<PathBuf, InstallError> {
        if dest.exists() {
            if let Err(err) = fs::remove_dir_all(dest) {
                warn!("Could not clear previous install at {}: {err}", dest.display());
            }
        }
        fs::create_dir_all(dest).map_err(|err| {
            InstallError::ExtractionFailed(format!("Cannot create {}: {err}", dest.display()))
        })?;
        let archive = staged.reopen().map_err(|err| {
            InstallError::ExtractionFailed(format!("Cannot reopen downloaded archive: {err}"))
        })?;
        let written = match archive::extract_zip(archive, dest, self.limits) {
            Ok(written) => written,
            Err(err) => {
                discard_partial_install(dest);
                return Err(err);
            }
        };
        if !dir_has_entries(dest) {
            if let Err(err) = fs::remove_dir(dest) {
                debug!("Leaving empty folder {}: {err}", dest.display());
            }
            return Err(InstallError::EmptyArchive {
                path: dest.to_path_buf(),
            });
        }
        debug!("Extracted {written} entries into {}", dest.display());
        Ok(dest.to_path_buf())
    }

    fn root(&self) -> Result<PathBuf, InstallError> {
        self.settings.validate_model_root_path().map_err(|err| {
            debug!("Model root unavailable: {err}");
            InstallError::RootNotConfigured
        })
    }
}

/// Trim `key` and require a single plain folder name.
pub(crate) fn validate_key(key: &str) -> Result<String, InstallError> {
    let trimmed = key.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
        return Err(InstallError::InvalidKey(key.to_string()));
    }
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == trimmed => Ok(trimmed.to_string()),
        _ => Err(InstallError::InvalidKey(key.to_string())),
    }
}

fn validate_url(url: &str) -> Result<String, InstallError> {
    let invalid = |reason: String| InstallError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid("URL is empty".into()));
    }
    let parsed = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn discard_partial_install(dest: &Path) {
    if let Err(err) = fs::remove_dir_all(dest) {
        warn!("Could not remove partial install at {}: {err}", dest.display());
    }
}

fn discard_download(staged: NamedTempFile) {
    let path = staged.path().to_path_buf();
    if let Err(err) = staged.close() {
        warn!("Could not delete partial download {}: {err}", path.display());
    }
}
