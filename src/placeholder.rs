//! Deterministic placeholder images for text prompts.
//!
//! The same trimmed prompt always yields the same pixels: colors and band
//! spacing come from the SHA-256 digest of the prompt.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use image::{ImageFormat, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 4096;
/// Width and height used when a request does not name a size.
pub const DEFAULT_DIMENSION: u32 = 512;

const FILE_HASH_BYTES: usize = 6;
const BAND_SHADE_PERCENT: u32 = 82;

#[derive(Debug, Error)]
pub enum PlaceholderError {
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error("Invalid image size {width}x{height} (each side must be 1..={max})", max = MAX_DIMENSION)]
    InvalidSize { width: u32, height: u32 },
    #[error("Image backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Prompt and output size for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

impl PlaceholderRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn validate(&self) -> Result<[u8; 32], PlaceholderError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(PlaceholderError::EmptyPrompt);
        }
        let in_range = |side: u32| (1..=MAX_DIMENSION).contains(&side);
        if !in_range(self.width) || !in_range(self.height) {
            return Err(PlaceholderError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(prompt_digest(prompt))
    }
}

fn prompt_digest(prompt: &str) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(prompt.as_bytes()));
    digest
}

/// Paint the placeholder for `request`.
pub fn render_placeholder(request: &PlaceholderRequest) -> Result<RgbaImage, PlaceholderError> {
    let digest = request.validate()?;
    Ok(paint(&digest, request.width, request.height))
}

/// Render `request` and write it as PNG into `dir`.
///
/// The file is named after the prompt digest, so repeating a prompt
/// overwrites its previous image.
pub fn save_placeholder(request: &PlaceholderRequest, dir: &Path) -> Result<PathBuf, PlaceholderError> {
    let digest = request.validate()?;
    let rendered = paint(&digest, request.width, request.height);
    let path = dir.join(file_name(&digest));
    fs::create_dir_all(dir).map_err(|err| PlaceholderError::Save {
        path: path.clone(),
        source: image::ImageError::IoError(err),
    })?;
    rendered
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|source| PlaceholderError::Save {
            path: path.clone(),
            source,
        })?;
    info!(
        "Wrote {}x{} placeholder to {}",
        request.width,
        request.height,
        path.display()
    );
    Ok(path)
}

fn file_name(digest: &[u8; 32]) -> String {
    let prefix: String = digest[..FILE_HASH_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("placeholder-{prefix}.png")
}

fn paint(digest: &[u8; 32], width: u32, height: u32) -> RgbaImage {
    let start = [digest[0], digest[1], digest[2]];
    let end = [digest[3], digest[4], digest[5]];
    let band = 8 + u32::from(digest[6]) % 24;
    let span = u64::from(width + height - 2).max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        let along = u64::from(x + y);
        let mut rgb = [0u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            *out = lerp(start[channel], end[channel], along, span);
        }
        if ((x + y) / band) % 2 == 1 {
            for out in rgb.iter_mut() {
                *out = (u32::from(*out) * BAND_SHADE_PERCENT / 100) as u8;
            }
        }
        Rgba([rgb[0], rgb[1], rgb[2], 255])
    })
}

fn lerp(from: u8, to: u8, step: u64, span: u64) -> u8 {
    let from = i64::from(from);
    let to = i64::from(to);
    let value = from + (to - from) * step as i64 / span as i64;
    value.clamp(0, 255) as u8
}

/// Which generator produces images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorBackend {
    #[default]
    Placeholder,
    Onnx,
}

impl GeneratorBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Onnx => "onnx",
        }
    }

    /// Produce an image for `request` in `dir`.
    pub fn generate(self, request: &PlaceholderRequest, dir: &Path) -> Result<PathBuf, PlaceholderError> {
        match self {
            Self::Placeholder => save_placeholder(request, dir),
            Self::Onnx => Err(PlaceholderError::BackendUnavailable(
                "ONNX inference is not included in this build".to_string(),
            )),
        }
    }
}

impl fmt::Display for GeneratorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "onnx" => Ok(Self::Onnx),
            other => Err(format!("Unknown backend '{other}'")),
        }
    }
}
