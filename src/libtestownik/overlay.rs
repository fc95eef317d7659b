use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use log::debug;

use crate::libtestownik::error::Result;

/// Working images are clamped so both dimensions land inside this band before
/// anything is drawn. The clamp is lossy and is not undone on removal.
pub const SIZE_LIMITS: [u32; 2] = [400, 600];

const WRAP_COLUMNS: usize = 40;
const MIN_BAND_HEIGHT: u32 = 100;
const TEXT_MARGIN: i32 = 10;
const LINE_EXTRA_SPACING: i32 = 5;

/// Adds and removes the question-text band above an image. All layout rules
/// are shared between `add_text_overlay` and `remove_text_overlay`, so removal
/// crops exactly what addition painted as long as the text matches.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// An annotator without a font still lays out the band deterministically;
    /// it just leaves the glyphs unpainted.
    pub fn new() -> Annotator {
        Annotator { font: None }
    }

    pub fn with_font(bytes: Vec<u8>) -> Result<Annotator> {
        Ok(Annotator {
            font: Some(FontVec::try_from_vec(bytes)?),
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Returns a new image: the source, size-clamped, below a white band
    /// carrying the wrapped question text.
    pub fn add_text_overlay(&self, image: &DynamicImage, text: &str) -> DynamicImage {
        let resized = clamp_size(image);
        let (width, height) = (resized.width(), resized.height());
        let size = font_size(width);
        let lines = wrap_text(text);
        let band = band_height(width, text);
        debug!(
            "[Overlay] {}x{} image, {} lines, font {}, band {} px.",
            width,
            height,
            lines.len(),
            size,
            band
        );

        let mut canvas = RgbImage::from_pixel(width, height + band, Rgb([255, 255, 255]));
        imageops::replace(&mut canvas, &resized.to_rgb8(), 0, i64::from(band));

        if let Some(font) = &self.font {
            let scale = PxScale::from(size as f32);
            let mut y = TEXT_MARGIN;
            for line in &lines {
                draw_text_mut(&mut canvas, Rgb([0, 0, 0]), TEXT_MARGIN, y, scale, font, line);
                y += size as i32 + LINE_EXTRA_SPACING;
            }
        }

        DynamicImage::ImageRgb8(canvas)
    }

    /// Crops the text band off the top again. Never resizes: the stored image
    /// already went through the clamp when the overlay was added.
    pub fn remove_text_overlay(&self, image: &DynamicImage, text: &str) -> DynamicImage {
        let band = band_height(image.width(), text);
        if band >= image.height() {
            // nothing left below the band, keep the image rather than crop to nothing
            return image.clone();
        }
        image.crop_imm(0, band, image.width(), image.height() - band)
    }
}

impl Default for Annotator {
    fn default() -> Annotator {
        Annotator::new()
    }
}

/// Upscales uniformly when a dimension is below the minimum, then downscales
/// uniformly when one exceeds the maximum. Aspect ratio is preserved.
pub fn clamp_size(image: &DynamicImage) -> DynamicImage {
    let [min, max] = SIZE_LIMITS;
    let (mut width, mut height) = (image.width(), image.height());
    let mut out = image.clone();

    if width < min || height < min {
        let factor = f64::max(f64::from(min) / f64::from(width), f64::from(min) / f64::from(height));
        width = (f64::from(width) * factor) as u32;
        height = (f64::from(height) * factor) as u32;
        out = out.resize_exact(width, height, FilterType::Triangle);
    }
    if width > max || height > max {
        let factor = f64::min(f64::from(max) / f64::from(width), f64::from(max) / f64::from(height));
        width = (f64::from(width) * factor) as u32;
        height = (f64::from(height) * factor) as u32;
        out = out.resize_exact(width, height, FilterType::Triangle);
    }
    out
}

/// One formula for both directions, keyed on width only. The overlay keeps the
/// width untouched, so addition and removal always agree on the band.
pub fn font_size(width: u32) -> u32 {
    (width / 20).clamp(20, 60)
}

/// Greedy word wrap: a word joins the current line unless the tentative length
/// would exceed the column budget.
pub fn wrap_text(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > WRAP_COLUMNS {
            lines.push(current.clone());
            current = word.to_string();
        } else if current.is_empty() {
            current = word.to_string();
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    lines.push(current);
    lines
}

pub fn band_height(width: u32, text: &str) -> u32 {
    let size = font_size(width);
    let lines = wrap_text(text).len();
    (lines as f64 * f64::from(size) * 1.3).max(f64::from(MIN_BAND_HEIGHT)) as u32
}
