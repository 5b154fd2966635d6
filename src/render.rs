//! Card Renderer
//!
//! Pure composition of background, text, photo and QR layers into a PNG.
//! Given the same credential, photo bytes and options the output is
//! byte-identical: nothing time-dependent is drawn.

use chrono::NaiveDate;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::{mask_cpf, Credential, CredentialId, CredentialStatus, IssuedIdentifiers};
use crate::layout::{CardFormat, CardLayout, Rect, TextSlot};
use crate::photo::{self, PhotoMask, PhotoShape};
use crate::qr::{self, QrError, QrLevel};
use crate::templates::{CardTemplate, TemplateError};

const REGULAR_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const BOLD_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

pub const NAME_FALLBACK: &str = "Name not provided";
pub const DATE_FALLBACK: &str = "Certification date not provided";
pub const CPF_FALLBACK: &str = "CPF not provided";
pub const CODE_LABEL: &str = "UNIQUE CODE";
const ELLIPSIS: &str = "...";

const NAME_COLOR: Rgba<u8> = Rgba([18, 32, 64, 255]);
const DETAIL_COLOR: Rgba<u8> = Rgba([52, 64, 84, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([96, 108, 128, 255]);
const QR_BACKING: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("asset missing: {0}")]
    AssetMissing(String),

    #[error("credential {id} is {status}, only approved credentials are rendered")]
    NotApproved { id: CredentialId, status: CredentialStatus },

    #[error("credential {0} has no issued identifiers")]
    NotIssued(CredentialId),

    #[error("QR encoding failed: {0}")]
    Encoding(#[from] QrError),

    #[error("render failed: {0}")]
    Failure(String),
}

impl RenderError {
    /// Caller-safe text; the `Display` form is for operator logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::AssetMissing(_) => "Card template unavailable",
            Self::NotApproved { .. } => "Credential is not approved",
            Self::NotIssued(_) => "Credential has not been issued",
            Self::Encoding(_) | Self::Failure(_) => "Card could not be rendered",
        }
    }
}

impl From<TemplateError> for RenderError {
    fn from(err: TemplateError) -> Self {
        Self::AssetMissing(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpfDisplay {
    Full,
    #[default]
    Masked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: CardFormat,
    pub cpf_display: CpfDisplay,
    pub photo_mask: PhotoMask,
    pub qr_level: QrLevel,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: CardFormat::Raster,
            cpf_display: CpfDisplay::Masked,
            photo_mask: PhotoMask::Rounded(14),
            qr_level: QrLevel::Medium,
        }
    }
}

struct CardFonts {
    regular: Font<'static>,
    bold: Font<'static>,
}

impl CardFonts {
    fn bundled() -> Result<Self, RenderError> {
        let load = |bytes: &'static [u8], name: &str| {
            Font::try_from_bytes(bytes).ok_or_else(|| {
                RenderError::AssetMissing(format!("font {name} is not a valid TrueType file"))
            })
        };
        Ok(Self {
            regular: load(REGULAR_FONT, "DejaVuSans")?,
            bold: load(BOLD_FONT, "DejaVuSans-Bold")?,
        })
    }
}

pub struct CardRenderer {
    template: CardTemplate,
    fonts: CardFonts,
    public_host: String,
}

impl CardRenderer {
    pub fn new(
        template: CardTemplate,
        public_host: impl Into<String>,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            template,
            fonts: CardFonts::bundled()?,
            public_host: public_host.into(),
        })
    }

    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    /// Render the card as PNG bytes.
    pub fn render(
        &self,
        credential: &Credential,
        photo: Option<&[u8]>,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, RenderError> {
        let canvas = self.render_image(credential, photo, options)?;

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(canvas.as_raw(), canvas.width(), canvas.height(), ColorType::Rgba8)
            .map_err(|e| RenderError::Failure(format!("PNG encoding: {e}")))?;
        Ok(png)
    }

    /// Compose every layer onto the canvas without encoding.
    pub fn render_image(
        &self,
        credential: &Credential,
        photo: Option<&[u8]>,
        options: &RenderOptions,
    ) -> Result<RgbaImage, RenderError> {
        if !credential.status.is_approved() {
            return Err(RenderError::NotApproved {
                id: credential.id.clone(),
                status: credential.status,
            });
        }
        let ids = credential
            .identifiers
            .as_ref()
            .ok_or_else(|| RenderError::NotIssued(credential.id.clone()))?;

        let layout = CardLayout::for_format(options.format);
        let url = qr::validation_url(&self.public_host, &ids.validation_token);
        let shape = PhotoShape {
            width: layout.photo.width,
            height: layout.photo.height,
            mask: options.photo_mask,
        };

        // Layers are independent; merge only once all are ready.
        let (photo_layer, qr_layer) = std::thread::scope(|scope| {
            let qr_job = scope.spawn(|| qr::encode(&url, layout.qr.width, options.qr_level));
            let photo_layer = prepare_photo_layer(&credential.id, photo, shape);
            (photo_layer, qr_job.join())
        });
        let qr_layer =
            qr_layer.map_err(|_| RenderError::Failure("QR worker panicked".to_string()))??;

        let mut canvas = self
            .template
            .background()
            .resize_to_fill(layout.width, layout.height, FilterType::Lanczos3)
            .to_rgba8();

        imageops::overlay(&mut canvas, &photo_layer, layout.photo.x as i64, layout.photo.y as i64);
        self.draw_text_stack(&mut canvas, &layout, credential, options.cpf_display);
        self.draw_identifier_block(&mut canvas, &layout, ids);
        place_qr(&mut canvas, &qr_layer, layout.qr, layout.qr_padding);

        Ok(canvas)
    }

    fn draw_text_stack(
        &self,
        canvas: &mut RgbaImage,
        layout: &CardLayout,
        credential: &Credential,
        cpf_display: CpfDisplay,
    ) {
        let name = non_empty(&credential.name).unwrap_or(NAME_FALLBACK);
        draw_line(canvas, &self.fonts.bold, layout.name, NAME_COLOR, name);

        let date_line = certification_line(credential.certification_date);
        draw_line(canvas, &self.fonts.regular, layout.certification_date, DETAIL_COLOR, &date_line);

        let cpf_text = cpf_line(credential.cpf.as_deref(), cpf_display);
        draw_line(canvas, &self.fonts.regular, layout.cpf, DETAIL_COLOR, &cpf_text);
    }

    fn draw_identifier_block(
        &self,
        canvas: &mut RgbaImage,
        layout: &CardLayout,
        ids: &IssuedIdentifiers,
    ) {
        let bold = &self.fonts.bold;
        draw_line(canvas, bold, layout.code_label, LABEL_COLOR, CODE_LABEL);
        draw_line(canvas, bold, layout.card_number, NAME_COLOR, ids.card_number.as_str());
    }
}

fn prepare_photo_layer(id: &CredentialId, photo: Option<&[u8]>, shape: PhotoShape) -> RgbaImage {
    match photo {
        Some(bytes) => photo::prepare(bytes, shape).unwrap_or_else(|e| {
            tracing::warn!(credential_id = %id, error = %e, "unusable photo, using placeholder");
            photo::placeholder(shape)
        }),
        None => photo::placeholder(shape),
    }
}

fn place_qr(canvas: &mut RgbaImage, qr_layer: &RgbaImage, slot: Rect, padding: u32) {
    let backing = RgbaImage::from_pixel(
        qr_layer.width() + 2 * padding,
        qr_layer.height() + 2 * padding,
        QR_BACKING,
    );
    let bx = slot.x as i64 - padding as i64;
    let by = slot.y as i64 - padding as i64;
    imageops::replace(canvas, &backing, bx, by);
    imageops::replace(canvas, qr_layer, slot.x as i64, slot.y as i64);
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub fn certification_line(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => format!("Certified since {}", date.format("%d/%m/%Y")),
        None => DATE_FALLBACK.to_string(),
    }
}

pub fn cpf_line(cpf: Option<&str>, display: CpfDisplay) -> String {
    match cpf.and_then(non_empty) {
        Some(cpf) => match display {
            CpfDisplay::Full => format!("CPF {cpf}"),
            CpfDisplay::Masked => format!("CPF {}", mask_cpf(cpf)),
        },
        None => CPF_FALLBACK.to_string(),
    }
}

fn text_width(font: &Font<'static>, size: f32, text: &str, letter_spacing: f32) -> f32 {
    let scale = Scale::uniform(size);
    let count = text.chars().count();
    text.chars()
        .map(|c| font.glyph(c).scaled(scale).h_metrics().advance_width)
        .sum::<f32>()
        + letter_spacing * count.saturating_sub(1) as f32
}

/// Shorten `text` with an ellipsis until it fits `max_width`.
fn fit_to_width(font: &Font<'static>, slot: TextSlot, text: &str) -> String {
    if text_width(font, slot.size, text, slot.letter_spacing) <= slot.max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate = format!("{}{ELLIPSIS}", chars.iter().collect::<String>().trim_end());
        if text_width(font, slot.size, &candidate, slot.letter_spacing) <= slot.max_width {
            return candidate;
        }
    }
    ELLIPSIS.to_string()
}

fn draw_line(
    canvas: &mut RgbaImage,
    font: &Font<'static>,
    slot: TextSlot,
    color: Rgba<u8>,
    text: &str,
) {
    let text = fit_to_width(font, slot, text);
    let scale = Scale::uniform(slot.size);
    let baseline = slot.y + font.v_metrics(scale).ascent;
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let mut caret = slot.x;

    for ch in text.chars() {
        let glyph = font.glyph(ch).scaled(scale).positioned(point(caret, baseline));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px >= width || py >= height || coverage <= 0.0 {
                    return;
                }
                let dst = canvas.get_pixel_mut(px as u32, py as u32);
                let alpha = coverage.min(1.0);
                for i in 0..3 {
                    let blended = color.0[i] as f32 * alpha + dst.0[i] as f32 * (1.0 - alpha);
                    dst.0[i] = blended.round() as u8;
                }
                dst.0[3] = 255;
            });
        }
        caret += glyph.unpositioned().h_metrics().advance_width + slot.letter_spacing;
    }
}
