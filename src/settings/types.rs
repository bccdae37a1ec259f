use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The persisted settings record.
///
/// Field names are camelCase on disk. Missing fields take their defaults and
/// unknown fields are ignored so older and newer builds can share a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Absolute path of the model folder; empty means unset.
    #[serde(default)]
    pub model_root_path: String,
    #[serde(default)]
    pub theme_mode: ThemeMode,
    /// Accent color such as `#3366ff`.
    #[serde(default)]
    pub theme_color: Option<String>,
}

impl AppSettings {
    /// Apply the same normalization the setters use.
    pub(crate) fn normalized(mut self) -> Self {
        self.model_root_path = self.model_root_path.trim().to_string();
        self.theme_color = normalize_color(self.theme_color.as_deref());
        self
    }
}

pub(crate) fn normalize_color(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|color| !color.is_empty())
        .map(str::to_string)
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!(
                "Unknown theme mode '{other}'; expected system, light or dark"
            )),
        }
    }
}
