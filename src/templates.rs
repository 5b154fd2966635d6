//! Card Template - Background Artwork
//!
//! The background is the one asset a card cannot be rendered without.
//! Loading it is where `AssetMissing` originates.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("background template {path} unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("background template is not a decodable image: {0}")]
    Undecodable(String),
}

#[derive(Debug, Clone)]
pub struct CardTemplate {
    background: DynamicImage,
}

impl CardTemplate {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        let background = image::load_from_memory(bytes)
            .map_err(|e| TemplateError::Undecodable(e.to_string()))?;
        if background.width() == 0 || background.height() == 0 {
            return Err(TemplateError::Undecodable("background has no pixels".to_string()));
        }
        Ok(Self { background })
    }

    pub fn from_image(background: DynamicImage) -> Self {
        Self { background }
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let bytes = fs::read(path).map_err(|e| TemplateError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn background(&self) -> &DynamicImage {
        &self.background
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.background.width(), self.background.height())
    }
}
