//! Raster normalization: turns a submitted drawing into the canonical raster.
//!
//! Accepted inputs are raw pixel buffers with declared dimensions, encoded
//! image bytes, and `data:` URLs as produced by a browser canvas. Every input
//! ends up as a square RGB raster of `target_size` pixels per side:
//! transparency is composited onto the white background, the drawing is
//! resized (up or down) to fit while keeping its aspect ratio, and centered.
//!
//! Pure image-to-image transform. No I/O, no model calls.

use std::io::Cursor;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgb, RgbImage, RgbaImage};
use thiserror::Error;
use tracing::debug;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Side length of the canonical square raster.
pub const CANONICAL_SIZE: u32 = 256;

/// Canvas background. Drawings are dark strokes on white.
pub const BACKGROUND: [u8; 3] = [255, 255, 255];

/// Maximum encoded payload size before rejecting.
/// Prevents OOM on corrupt/adversarial submissions.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10 MB

/// Smallest payload worth handing to a decoder (a PNG signature alone is 8 bytes).
const MIN_IMAGE_BYTES: usize = 8;

/// Largest declared side for raw pixel buffers.
const MAX_DIMENSION: u32 = 8192;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Image data too small to be valid")]
    TooSmall,

    #[error("Image data exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: usize },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image has zero width or height")]
    ZeroDimensions,

    #[error("Image dimensions {width}x{height} exceed the {max} pixel limit")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },

    #[error("Pixel buffer holds {actual} bytes, {width}x{height} {layout:?} needs {expected}")]
    BufferMismatch {
        width: u32,
        height: u32,
        layout: PixelLayout,
        expected: usize,
        actual: usize,
    },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

// ═══════════════════════════════════════════════════════════
// Input and output types
// ═══════════════════════════════════════════════════════════

/// Channel layout of a raw 8-bit pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// A drawing as submitted, before normalization.
#[derive(Debug, Clone)]
pub enum RasterInput {
    /// Raw pixels with declared dimensions, row-major, no padding.
    Pixels {
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    },
    /// Encoded image bytes (PNG, JPEG, GIF, BMP).
    Encoded(Vec<u8>),
    /// `data:image/...;base64,` URL, or a bare base64 payload.
    DataUrl(String),
}

/// Canonical RGB raster. Immutable once constructed.
///
/// Wraps an `RgbImage`, so `width * height * 3 == pixels().len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    image: RgbImage,
}

impl Raster {
    pub const CHANNELS: usize = 3;

    /// Build a raster from an RGB buffer, checking the buffer length.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::ZeroDimensions);
        }
        let actual = pixels.len();
        RgbImage::from_raw(width, height, pixels)
            .filter(|img| img.as_raw().len() == actual)
            .map(|image| Self { image })
            .ok_or(RasterError::BufferMismatch {
                width,
                height,
                layout: PixelLayout::Rgb,
                expected: width as usize * height as usize * Self::CHANNELS,
                actual,
            })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Encode as PNG for storage and display.
    pub fn to_png(&self) -> Result<Vec<u8>, RasterError> {
        encode_png(&self.image)
    }
}

/// CatmullRom keeps strokes sharp without ringing around high-contrast edges.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

// ═══════════════════════════════════════════════════════════
// RasterNormalizer
// ═══════════════════════════════════════════════════════════

/// Decodes any `RasterInput` into the canonical raster.
#[derive(Debug, Clone)]
pub struct RasterNormalizer {
    target_size: u32,
}

impl Default for RasterNormalizer {
    fn default() -> Self {
        Self::new(CANONICAL_SIZE)
    }
}

impl RasterNormalizer {
    pub fn new(target_size: u32) -> Self {
        Self {
            target_size: target_size.max(1),
        }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Decode, flatten onto white, fit and center.
    pub fn normalize(&self, input: &RasterInput) -> Result<Raster, RasterError> {
        let flat = match input {
            RasterInput::Pixels {
                width,
                height,
                layout,
                data,
            } => flatten_pixels(*width, *height, *layout, data)?,
            RasterInput::Encoded(bytes) => decode_encoded(bytes)?,
            RasterInput::DataUrl(url) => decode_encoded(&decode_data_url(url)?)?,
        };
        Ok(self.fit(flat))
    }

    /// Resize to fit the canonical square and paste centered on white.
    /// Input already at the canonical size is passed through untouched.
    fn fit(&self, image: RgbImage) -> Raster {
        let target = self.target_size;
        let (w, h) = (image.width(), image.height());
        if w == target && h == target {
            return Raster { image };
        }

        let (content_w, content_h) = compute_fit_dimensions(w, h, target);
        let resized = image::imageops::resize(&image, content_w, content_h, RESIZE_FILTER);

        let mut canvas = RgbImage::from_pixel(target, target, Rgb(BACKGROUND));
        let offset_x = (target - content_w) / 2;
        let offset_y = (target - content_h) / 2;
        image::imageops::overlay(&mut canvas, &resized, offset_x, offset_y);

        debug!(
            original = format!("{w}x{h}"),
            content = format!("{content_w}x{content_h}"),
            output = format!("{target}x{target}"),
            "Drawing resampled to canonical raster"
        );

        Raster { image: canvas }
    }
}

// ═══════════════════════════════════════════════════════════
// Pure helper functions
// ═══════════════════════════════════════════════════════════

/// Strip a `data:` URL prefix and decode the base64 payload.
/// A payload without a comma is treated as bare base64.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, RasterError> {
    let trimmed = data_url.trim();
    let payload = match trimmed.find(',') {
        Some(idx) => {
            let header = &trimmed[..idx];
            if !header.starts_with("data:") || !header.ends_with(";base64") {
                return Err(RasterError::InvalidDataUrl(
                    "expected a base64 data URL".into(),
                ));
            }
            &trimmed[idx + 1..]
        }
        None => trimmed,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| RasterError::InvalidDataUrl(format!("Base64 decode failed: {e}")))
}

/// Validate encoded bytes before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), RasterError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(RasterError::TooSmall);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(RasterError::TooLarge {
            limit_mb: MAX_IMAGE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

fn decode_encoded(bytes: &[u8]) -> Result<RgbImage, RasterError> {
    validate_image_bytes(bytes)?;
    let img = image::load_from_memory(bytes).map_err(|e| RasterError::Decode(e.to_string()))?;
    let (w, h) = img.dimensions();
    check_dimensions(w, h)?;
    Ok(flatten_rgba(&to_rgba(img)))
}

fn to_rgba(img: DynamicImage) -> RgbaImage {
    match img {
        DynamicImage::ImageRgba8(rgba) => rgba,
        other => other.to_rgba8(),
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), RasterError> {
    if width == 0 || height == 0 {
        return Err(RasterError::ZeroDimensions);
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RasterError::DimensionsTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Convert a raw buffer of any supported layout into RGB over white.
fn flatten_pixels(
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: &[u8],
) -> Result<RgbImage, RasterError> {
    check_dimensions(width, height)?;
    let expected = width as usize * height as usize * layout.channels();
    if data.len() != expected {
        return Err(RasterError::BufferMismatch {
            width,
            height,
            layout,
            expected,
            actual: data.len(),
        });
    }

    let rgb: Vec<u8> = data
        .chunks_exact(layout.channels())
        .flat_map(|px| match layout {
            PixelLayout::Gray => [px[0], px[0], px[0]],
            PixelLayout::GrayAlpha => {
                let v = composite(px[0], px[1]);
                [v, v, v]
            }
            PixelLayout::Rgb => [px[0], px[1], px[2]],
            PixelLayout::Rgba => [
                composite(px[0], px[3]),
                composite(px[1], px[3]),
                composite(px[2], px[3]),
            ],
        })
        .collect();

    RgbImage::from_raw(width, height, rgb).ok_or(RasterError::BufferMismatch {
        width,
        height,
        layout,
        expected,
        actual: data.len(),
    })
}

fn flatten_rgba(rgba: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        *dst = Rgb([composite(r, a), composite(g, a), composite(b, a)]);
    }
    out
}

/// Alpha-composite one channel onto the white background.
fn composite(value: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((value as u32 * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Compute dimensions that fit inside a square while preserving aspect ratio.
///
/// The longest edge becomes `target_size`; small drawings are scaled up.
pub fn compute_fit_dimensions(width: u32, height: u32, target_size: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }

    let scale = (target_size as f32 / width as f32).min(target_size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, target_size);

    (new_w, new_h)
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, RasterError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| RasterError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_bytes(img: RgbaImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn data_url(bytes: &[u8]) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn canonical_rgb_input_passes_through() {
        let pixels = vec![200u8; 256 * 256 * 3];
        let raster = RasterNormalizer::default()
            .normalize(&RasterInput::Pixels {
                width: 256,
                height: 256,
                layout: PixelLayout::Rgb,
                data: pixels.clone(),
            })
            .unwrap();
        assert_eq!(raster.pixels(), pixels.as_slice());
    }

    #[test]
    fn output_is_always_canonical_size() {
        let normalizer = RasterNormalizer::default();
        for (w, h) in [(10, 10), (640, 480), (100, 900), (1, 1)] {
            let raster = normalizer
                .normalize(&RasterInput::Pixels {
                    width: w,
                    height: h,
                    layout: PixelLayout::Gray,
                    data: vec![0; (w * h) as usize],
                })
                .unwrap();
            assert_eq!((raster.width(), raster.height()), (256, 256));
            assert_eq!(raster.pixels().len(), 256 * 256 * Raster::CHANNELS);
        }
    }

    #[test]
    fn wide_drawing_is_letterboxed_on_white() {
        let raster = RasterNormalizer::default()
            .normalize(&RasterInput::Pixels {
                width: 200,
                height: 100,
                layout: PixelLayout::Gray,
                data: vec![0; 200 * 100],
            })
            .unwrap();
        // Top row is padding, center row is ink
        assert_eq!(raster.image().get_pixel(128, 0).0, BACKGROUND);
        assert_eq!(raster.image().get_pixel(128, 128).0, [0, 0, 0]);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let raster = RasterNormalizer::default()
            .normalize(&RasterInput::Pixels {
                width: 2,
                height: 1,
                layout: PixelLayout::Rgba,
                data: vec![0, 0, 0, 0, 0, 0, 0, 255],
            })
            .unwrap();
        assert_eq!(raster.image().get_pixel(0, 128).0, BACKGROUND);
        assert_eq!(raster.image().get_pixel(255, 128).0, [0, 0, 0]);
    }

    #[test]
    fn data_url_png_decodes() {
        let mut img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
        img.put_pixel(32, 32, Rgba([0, 0, 0, 255]));
        let url = data_url(&png_bytes(img));

        let raster = RasterNormalizer::default()
            .normalize(&RasterInput::DataUrl(url))
            .unwrap();
        assert_eq!(raster.width(), 256);
        // Corner was transparent → white
        assert_eq!(raster.image().get_pixel(0, 0).0, BACKGROUND);
    }

    #[test]
    fn bare_base64_is_accepted() {
        let bytes = png_bytes(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        let raw = base64::engine::general_purpose::STANDARD.encode(&bytes);
        assert_eq!(decode_data_url(&raw).unwrap(), bytes);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = decode_data_url("data:image/png;base64,not-valid-base64!!!").unwrap_err();
        assert!(matches!(err, RasterError::InvalidDataUrl(_)));
    }

    #[test]
    fn non_base64_data_url_is_rejected() {
        let err = decode_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, RasterError::InvalidDataUrl(_)));
    }

    #[test]
    fn corrupt_encoding_is_decode_error() {
        let err = RasterNormalizer::default()
            .normalize(&RasterInput::Encoded(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5]))
            .unwrap_err();
        assert!(matches!(err, RasterError::Decode(_)));
    }

    #[test]
    fn tiny_payload_is_rejected_before_decoding() {
        let err = RasterNormalizer::default()
            .normalize(&RasterInput::Encoded(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, RasterError::TooSmall));
    }

    #[test]
    fn zero_dimensions_rejected() {
        let err = RasterNormalizer::default()
            .normalize(&RasterInput::Pixels {
                width: 0,
                height: 10,
                layout: PixelLayout::Rgb,
                data: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, RasterError::ZeroDimensions));
    }

    #[test]
    fn buffer_dimension_mismatch_rejected() {
        let err = RasterNormalizer::default()
            .normalize(&RasterInput::Pixels {
                width: 4,
                height: 4,
                layout: PixelLayout::Rgba,
                data: vec![0; 4 * 4 * 3],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RasterError::BufferMismatch { expected: 64, actual: 48, .. }
        ));
    }

    #[test]
    fn from_rgb_checks_length() {
        assert!(Raster::from_rgb(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            Raster::from_rgb(2, 2, vec![0; 11]),
            Err(RasterError::BufferMismatch { .. })
        ));
    }

    #[test]
    fn fit_dimensions_preserve_aspect_ratio() {
        assert_eq!(compute_fit_dimensions(512, 256, 256), (256, 128));
        assert_eq!(compute_fit_dimensions(64, 128, 256), (128, 256));
        assert_eq!(compute_fit_dimensions(0, 5, 256), (1, 1));
    }

    #[test]
    fn composite_blends_toward_white() {
        assert_eq!(composite(0, 255), 0);
        assert_eq!(composite(0, 0), 255);
        assert_eq!(composite(0, 128), 127);
    }

    #[test]
    fn png_round_trip_keeps_pixels() {
        let raster = Raster::from_rgb(3, 1, vec![0, 0, 0, 128, 128, 128, 255, 255, 255]).unwrap();
        let png = raster.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.as_raw(), raster.pixels());
    }
}
