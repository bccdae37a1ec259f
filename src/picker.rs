//! Choosing the model folder through a folder dialog.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::settings::SettingsStore;

const PICK_MODEL_ROOT_TITLE: &str = "Select model folder";

/// Something that can ask the user for a folder.
pub trait FolderPicker {
    /// `None` when the user dismisses the dialog.
    fn pick_folder(&self, title: &str, start: Option<&Path>) -> Option<PathBuf>;
}

/// The platform folder dialog.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFolderPicker;

impl FolderPicker for NativeFolderPicker {
    fn pick_folder(&self, title: &str, start: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().set_title(title);
        if let Some(start) = start {
            dialog = dialog.set_directory(start);
        }
        dialog.pick_folder()
    }
}

/// Ask for a model folder and store it; returns the stored value.
///
/// The dialog opens at the current root when that folder still exists.
/// A folder whose path is not valid UTF-8 is refused and the root is kept.
pub fn choose_model_root(store: &SettingsStore, picker: &dyn FolderPicker) -> Option<String> {
    let current = store.model_root_path();
    let start = (!current.is_empty())
        .then(|| PathBuf::from(&current))
        .filter(|path| path.is_dir());
    let picked = picker.pick_folder(PICK_MODEL_ROOT_TITLE, start.as_deref())?;
    let Some(root) = picked.to_str() else {
        warn!(
            "Ignoring model folder with a non UTF-8 path: {}",
            picked.display()
        );
        return None;
    };
    store.set_model_root_path(root);
    let stored = store.model_root_path();
    info!("Model folder set to {stored}");
    Some(stored)
}
