//! Print Format
//!
//! The print card is specified in points (243x153 pt, ID-1 proportions) and
//! rasterized at a chosen DPI.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CARD_WIDTH_PT: f64 = 243.0;
pub const CARD_HEIGHT_PT: f64 = 153.0;
pub const POINTS_PER_INCH: f64 = 72.0;

// Below this the QR layer cannot hold a validation URL.
pub const MIN_DPI: u32 = 150;
pub const MAX_DPI: u32 = 1200;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("DPI must be between {MIN_DPI} and {MAX_DPI}, got {0}")]
pub struct PrintSpecError(pub u32);

/// Print specification for the physical card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintSpec {
    pub dpi: u32,
}

impl Default for PrintSpec {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

impl PrintSpec {
    /// Create from a caller-supplied DPI with validation
    pub fn from_user(dpi: u32) -> Result<Self, PrintSpecError> {
        if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
            return Err(PrintSpecError(dpi));
        }
        Ok(Self { dpi })
    }

    /// Canvas size in pixels for the card at this DPI.
    pub fn canvas_px(&self) -> (u32, u32) {
        let scale = self.dpi as f64 / POINTS_PER_INCH;
        (
            (CARD_WIDTH_PT * scale).round() as u32,
            (CARD_HEIGHT_PT * scale).round() as u32,
        )
    }
}
