use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use super::{AppSettings, SettingsError};

/// Read the record at `path`; `Ok(None)` when the file does not exist.
pub(super) fn load_settings_from(path: &Path) -> Result<Option<AppSettings>, SettingsError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice::<AppSettings>(&bytes)
        .map(|settings| Some(settings.normalized()))
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Replace the file at `path` with `settings` in one rename.
pub(super) fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), SettingsError> {
    let staged = stage_settings(settings, path)?;
    commit_staged(staged, path)
}

/// Write the serialized record into a temporary file next to `path`.
pub(super) fn stage_settings(
    settings: &AppSettings,
    path: &Path,
) -> Result<NamedTempFile, SettingsError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let persist_err = |source: io::Error| SettingsError::Persist {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(persist_err)?;
    let data = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    let mut staged = tempfile::Builder::new()
        .prefix(".settings-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(persist_err)?;
    staged.write_all(&data).map_err(persist_err)?;
    staged.as_file().sync_all().map_err(persist_err)?;
    Ok(staged)
}

/// Rename a staged file over `path`, replacing any previous record.
pub(super) fn commit_staged(staged: NamedTempFile, path: &Path) -> Result<(), SettingsError> {
    staged
        .persist(path)
        .map(|_| ())
        .map_err(|err| SettingsError::Persist {
            path: path.to_path_buf(),
            source: err.error,
        })
}
