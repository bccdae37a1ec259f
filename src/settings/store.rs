use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, info, warn};

use crate::app_dirs;

use super::{
    AppSettings, SETTINGS_FILE_NAME, SettingsError, ThemeMode, persist, types::normalize_color,
};

type RootListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Process-wide settings owner.
///
/// Construct one at startup and share it (usually behind an [`Arc`]) with
/// whatever needs configuration. Reads and writes are serialized by a single
/// mutex; root-path listeners run after that mutex is released, so they may
/// call back into the store.
pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<AppSettings>,
    listeners: Mutex<Vec<RootListener>>,
}

impl SettingsStore {
    /// Open the store at `<app dir>/settings.json`.
    pub fn open() -> Result<Self, SettingsError> {
        let dir = app_dirs::app_root_dir()?;
        Ok(Self::open_at(dir.join(SETTINGS_FILE_NAME)))
    }

    /// Open the store backed by an explicit file.
    ///
    /// An unreadable or malformed file is logged and replaced by defaults in
    /// memory; it is overwritten on the next change.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Could not create settings folder {}: {err}", parent.display());
            }
        }
        let settings = match persist::load_settings_from(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("No settings at {}; using defaults", path.display());
                AppSettings::default()
            }
            Err(err) => {
                warn!("Ignoring settings file: {err}");
                AppSettings::default()
            }
        };
        Self {
            path,
            state: Mutex::new(settings),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> AppSettings {
        self.state().clone()
    }

    /// Configured model root; empty when unset.
    pub fn model_root_path(&self) -> String {
        self.state().model_root_path.clone()
    }

    /// Model root together with whether one is set.
    pub fn try_model_root(&self) -> (String, bool) {
        let root = self.model_root_path();
        let configured = !root.is_empty();
        (root, configured)
    }

    /// Store a new model root.
    ///
    /// Whitespace is trimmed and an unchanged value is ignored. A failed save
    /// is logged and the in-memory value is kept. Listeners are told about
    /// the new value once the store is unlocked.
    pub fn set_model_root_path(&self, path: &str) {
        let normalized = path.trim().to_string();
        {
            let mut state = self.state();
            if state.model_root_path == normalized {
                return;
            }
            state.model_root_path = normalized.clone();
            self.save_best_effort(&state);
        }
        info!("Model folder set to '{normalized}'");
        self.notify_root_changed(&normalized);
    }

    /// Check the model root is set and points at a directory.
    pub fn validate_model_root_path(&self) -> Result<PathBuf, SettingsError> {
        let root = self.model_root_path();
        if root.trim().is_empty() {
            return Err(SettingsError::NotConfigured);
        }
        let path = PathBuf::from(root);
        if !path.is_dir() {
            return Err(SettingsError::NotFound { path });
        }
        Ok(path)
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.state().theme_mode
    }

    pub fn set_theme_mode(&self, mode: ThemeMode) {
        let mut state = self.state();
        if state.theme_mode == mode {
            return;
        }
        state.theme_mode = mode;
        self.save_best_effort(&state);
    }

    pub fn theme_color(&self) -> Option<String> {
        self.state().theme_color.clone()
    }

    /// Set the accent color; `None` or a blank string clears it.
    pub fn set_theme_color(&self, color: Option<&str>) {
        let normalized = normalize_color(color);
        let mut state = self.state();
        if state.theme_color == normalized {
            return;
        }
        state.theme_color = normalized;
        self.save_best_effort(&state);
    }

    /// Register a callback for model-root changes.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(Arc::new(listener));
    }

    fn state(&self) -> MutexGuard<'_, AppSettings> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Persist while the caller still holds the state lock.
    fn save_best_effort(&self, settings: &AppSettings) {
        if let Err(err) = persist::save_settings_to(settings, &self.path) {
            warn!("Settings change kept in memory only: {err}");
        }
    }

    fn notify_root_changed(&self, root: &str) {
        let listeners: Vec<RootListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone();
        for listener in listeners {
            listener(root);
        }
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("settings", &*self.state())
            .finish()
    }
}
