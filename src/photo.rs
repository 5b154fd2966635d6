//! Photo Layer
//!
//! Turns stored photo bytes into a fixed-size layer, or draws a silhouette
//! placeholder of the same size when there is nothing usable.

use std::collections::HashMap;

use axum::async_trait;
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PLACEHOLDER_BACKDROP: Rgba<u8> = Rgba([217, 222, 228, 255]);
const PLACEHOLDER_FIGURE: Rgba<u8> = Rgba([154, 165, 177, 255]);

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid photo: {0}")]
    InvalidPhoto(String),

    #[error("photo fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "radius")]
pub enum PhotoMask {
    Square,
    Circle,
    Rounded(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoShape {
    pub width: u32,
    pub height: u32,
    pub mask: PhotoMask,
}

/// Decode, fill `shape` keeping aspect ratio, center-crop, then mask.
pub fn prepare(bytes: &[u8], shape: PhotoShape) -> Result<RgbaImage, PhotoError> {
    if shape.width == 0 || shape.height == 0 {
        return Err(PhotoError::InvalidPhoto("empty target shape".to_string()));
    }
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PhotoError::InvalidPhoto(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(PhotoError::InvalidPhoto("photo has no pixels".to_string()));
    }

    let mut layer = decoded
        .resize_to_fill(shape.width, shape.height, FilterType::Lanczos3)
        .to_rgba8();
    apply_mask(&mut layer, shape.mask);
    Ok(layer)
}

/// Head-and-shoulders silhouette, same footprint as a prepared photo.
pub fn placeholder(shape: PhotoShape) -> RgbaImage {
    let (w, h) = (shape.width as f32, shape.height as f32);
    let head_cx = w / 2.0;
    let head_cy = h * 0.38;
    let head_r = w.min(h) * 0.2;
    let body_cy = h * 1.02;
    let body_rx = w * 0.38;
    let body_ry = h * 0.36;

    let mut layer = RgbaImage::from_fn(shape.width, shape.height, |x, y| {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let in_head = (px - head_cx).powi(2) + (py - head_cy).powi(2) <= head_r * head_r;
        let in_body =
            ((px - head_cx) / body_rx).powi(2) + ((py - body_cy) / body_ry).powi(2) <= 1.0;
        if in_head || in_body {
            PLACEHOLDER_FIGURE
        } else {
            PLACEHOLDER_BACKDROP
        }
    });
    apply_mask(&mut layer, shape.mask);
    layer
}

fn apply_mask(layer: &mut RgbaImage, mask: PhotoMask) {
    let (w, h) = (layer.width() as i32, layer.height() as i32);
    match mask {
        PhotoMask::Square => {}
        PhotoMask::Circle => {
            let cx = (w - 1) as f32 / 2.0;
            let cy = (h - 1) as f32 / 2.0;
            let r = w.min(h) as f32 / 2.0;
            for (x, y, p) in layer.enumerate_pixels_mut() {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if (dx * dx + dy * dy).sqrt() > r {
                    p.0[3] = 0;
                }
            }
        }
        PhotoMask::Rounded(radius) => {
            let r = (radius as i32).min(w / 2).min(h / 2);
            if r == 0 {
                return;
            }
            for (x, y, p) in layer.enumerate_pixels_mut() {
                if !rounded_rect_contains(x as i32, y as i32, w, h, r) {
                    p.0[3] = 0;
                }
            }
        }
    }
}

fn rounded_rect_contains(x: i32, y: i32, w: i32, h: i32, r: i32) -> bool {
    if (x >= r && x < w - r) || (y >= r && y < h - r) {
        return true;
    }
    let cx = if x < r { r - 1 } else { w - r };
    let cy = if y < r { r - 1 } else { h - r };
    let (dx, dy) = (x - cx, y - cy);
    dx * dx + dy * dy <= r * r
}

/// External object store holding member photos.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// `Ok(None)` when the store has nothing under `reference`.
    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, PhotoError>;
}

/// Fetches `<base_url>/<reference>` over HTTP.
pub struct HttpPhotoSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPhotoSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PhotoSource for HttpPhotoSource {
    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, PhotoError> {
        let url = format!("{}/{}", self.base_url, reference.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PhotoError::Fetch(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| PhotoError::Fetch(e.to_string()))?;
        let body = response.bytes().await.map_err(|e| PhotoError::Fetch(e.to_string()))?;
        Ok(Some(body.to_vec()))
    }
}

#[derive(Default)]
pub struct MemoryPhotoSource {
    photos: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryPhotoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: Vec<u8>) {
        self.photos.write().insert(reference.into(), bytes);
    }
}

#[async_trait]
impl PhotoSource for MemoryPhotoSource {
    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, PhotoError> {
        Ok(self.photos.read().get(reference).cloned())
    }
}
