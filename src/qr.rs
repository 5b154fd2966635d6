//! QR Layer
//!
//! Encodes the public validation URL into a square raster layer. Only error
//! correction levels that survive print wear and partial occlusion are
//! offered.

use image::{DynamicImage, GenericImage, ImageBuffer, Luma, Rgba, RgbaImage};
use qrcode::types::QrError as SymbolError;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::ValidationToken;

/// Quiet zone width in modules on each side, per the QR standard.
const QUIET_ZONE_MODULES: u32 = 4;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("payload of {0} bytes exceeds QR symbol capacity")]
    DataTooLong(usize),

    #[error("QR symbol needs {modules} modules but layer is only {size}px wide")]
    LayerTooSmall { modules: u32, size: u32 },

    #[error("QR encoding failed: {0}")]
    Symbol(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrLevel {
    #[default]
    Medium,
    Quartile,
    High,
}

impl From<QrLevel> for EcLevel {
    fn from(level: QrLevel) -> Self {
        match level {
            QrLevel::Medium => EcLevel::M,
            QrLevel::Quartile => EcLevel::Q,
            QrLevel::High => EcLevel::H,
        }
    }
}

/// `https://<host>/validar/<token>`; `host` may carry a scheme or trailing slash.
pub fn validation_url(host: &str, token: &ValidationToken) -> String {
    let host = host
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("https://{host}/validar/{token}")
}

/// Encode `url` into an opaque `size`x`size` RGBA layer, black on white,
/// quiet zone included. Identical inputs give identical pixels.
pub fn encode(url: &str, size: u32, level: QrLevel) -> Result<RgbaImage, QrError> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), level.into()).map_err(
        |e| match e {
            SymbolError::DataTooLong => QrError::DataTooLong(url.len()),
            other => QrError::Symbol(other.to_string()),
        },
    )?;

    let modules = code.width() as u32 + 2 * QUIET_ZONE_MODULES;
    if modules > size {
        return Err(QrError::LayerTooSmall { modules, size });
    }
    let module_px = size / modules;

    let symbol: ImageBuffer<Luma<u8>, Vec<u8>> = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .module_dimensions(module_px, module_px)
        .build();
    let symbol = DynamicImage::ImageLuma8(symbol).to_rgba8();

    // Integer module size keeps edges crisp; leftover pixels become margin.
    let mut layer = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
    let offset_x = (size - symbol.width().min(size)) / 2;
    let offset_y = (size - symbol.height().min(size)) / 2;
    layer
        .copy_from(&symbol, offset_x, offset_y)
        .map_err(|e| QrError::Symbol(e.to_string()))?;
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ValidationToken {
        ValidationToken::parse(&"a1b2".repeat(16)).unwrap()
    }

    #[test]
    fn test_validation_url_normalizes_host() {
        let t = token();
        let expected = format!("https://cards.example.org/validar/{t}");
        assert_eq!(validation_url("cards.example.org", &t), expected);
        assert_eq!(validation_url("https://cards.example.org/", &t), expected);
    }

    #[test]
    fn test_encode_exact_size() {
        let url = validation_url("cards.example.org", &token());
        let layer = encode(&url, 180, QrLevel::Medium).unwrap();
        assert_eq!(layer.dimensions(), (180, 180));
        // quiet zone corner stays white
        assert_eq!(layer.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let url = validation_url("cards.example.org", &token());
        let a = encode(&url, 150, QrLevel::High).unwrap();
        let b = encode(&url, 150, QrLevel::High).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_encode_has_dark_modules() {
        let url = validation_url("cards.example.org", &token());
        let layer = encode(&url, 200, QrLevel::Quartile).unwrap();
        assert!(layer.pixels().any(|p| p.0[0] == 0));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let url = "x".repeat(5000);
        let err = encode(&url, 400, QrLevel::High).unwrap_err();
        assert!(matches!(err, QrError::DataTooLong(5000)));
    }

    #[test]
    fn test_encode_rejects_tiny_layer() {
        let url = validation_url("cards.example.org", &token());
        let err = encode(&url, 20, QrLevel::Medium).unwrap_err();
        assert!(matches!(err, QrError::LayerTooSmall { .. }));
    }

    #[test]
    fn test_default_level_is_medium() {
        assert_eq!(QrLevel::default(), QrLevel::Medium);
    }
}
