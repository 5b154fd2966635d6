//! Card Layout
//!
//! One relative layout serves every canvas size. Positions are authored on
//! the 1063x591 reference card; x coordinates scale with canvas width, y
//! coordinates with canvas height, and sizes with the smaller of the two
//! factors so squares stay square.

use serde::{Deserialize, Serialize};

use crate::print::PrintSpec;

pub const REFERENCE_WIDTH: u32 = 1063;
pub const REFERENCE_HEIGHT: u32 = 591;

const LEFT_MARGIN: f32 = 64.0;
const TEXT_COLUMN_RIGHT: f32 = 780.0;

const NAME_SIZE: f32 = 46.0;
const DATE_SIZE: f32 = 24.0;
const CPF_SIZE: f32 = 24.0;
pub const NAME_TO_DATE_GAP: f32 = 18.0;
pub const DATE_TO_CPF_GAP: f32 = 10.0;

const LABEL_Y: f32 = 478.0;
const LABEL_SIZE: f32 = 14.0;
const LABEL_LETTER_SPACING: f32 = 2.5;
const CARD_NUMBER_Y: f32 = 500.0;
const CARD_NUMBER_SIZE: f32 = 28.0;

const PHOTO_X: f32 = 843.0;
const PHOTO_Y: f32 = 48.0;
const PHOTO_WIDTH: f32 = 168.0;
const PHOTO_HEIGHT: f32 = 210.0;

const QR_X: f32 = 871.0;
const QR_Y: f32 = 383.0;
const QR_SIZE: f32 = 160.0;
const QR_PADDING: f32 = 8.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum CardFormat {
    /// 1063x591 px download.
    #[default]
    Raster,
    /// 243x153 pt card rasterized at the print DPI.
    Print(PrintSpec),
}

impl CardFormat {
    pub fn canvas_px(&self) -> (u32, u32) {
        match self {
            Self::Raster => (REFERENCE_WIDTH, REFERENCE_HEIGHT),
            Self::Print(spec) => spec.canvas_px(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where one line of text starts (top-left of its line box) and how big it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSlot {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub max_width: f32,
    pub letter_spacing: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardLayout {
    pub width: u32,
    pub height: u32,
    pub name: TextSlot,
    pub certification_date: TextSlot,
    pub cpf: TextSlot,
    pub code_label: TextSlot,
    pub card_number: TextSlot,
    pub photo: Rect,
    pub qr: Rect,
    pub qr_padding: u32,
}

impl CardLayout {
    pub fn for_format(format: CardFormat) -> Self {
        let (width, height) = format.canvas_px();
        Self::for_canvas(width, height)
    }

    pub fn for_canvas(width: u32, height: u32) -> Self {
        let sx = width as f32 / REFERENCE_WIDTH as f32;
        let sy = height as f32 / REFERENCE_HEIGHT as f32;
        let s = sx.min(sy);

        let left = LEFT_MARGIN * sx;
        let column = (TEXT_COLUMN_RIGHT - LEFT_MARGIN) * sx;
        let line = |y: f32, size: f32, letter_spacing: f32| TextSlot {
            x: left,
            y,
            size: size * s,
            max_width: column,
            letter_spacing: letter_spacing * s,
        };

        // Block height comes from the constants alone, never from glyph
        // metrics, so every name lands the stack in the same place.
        let block = (NAME_SIZE + NAME_TO_DATE_GAP + DATE_SIZE + DATE_TO_CPF_GAP + CPF_SIZE) * s;
        let top = (height as f32 - block) / 2.0;
        let date_y = top + (NAME_SIZE + NAME_TO_DATE_GAP) * s;
        let cpf_y = date_y + (DATE_SIZE + DATE_TO_CPF_GAP) * s;

        let px = |v: f32| v.round().max(0.0) as u32;

        Self {
            width,
            height,
            name: line(top, NAME_SIZE, 0.0),
            certification_date: line(date_y, DATE_SIZE, 0.0),
            cpf: line(cpf_y, CPF_SIZE, 0.0),
            code_label: line(LABEL_Y * sy, LABEL_SIZE, LABEL_LETTER_SPACING),
            card_number: line(CARD_NUMBER_Y * sy, CARD_NUMBER_SIZE, 0.0),
            photo: Rect {
                x: px(PHOTO_X * sx),
                y: px(PHOTO_Y * sy),
                width: px(PHOTO_WIDTH * s).max(1),
                height: px(PHOTO_HEIGHT * s).max(1),
            },
            qr: Rect {
                x: px(QR_X * sx),
                y: px(QR_Y * sy),
                width: px(QR_SIZE * s).max(1),
                height: px(QR_SIZE * s).max(1),
            },
            qr_padding: px(QR_PADDING * s),
        }
    }
}
