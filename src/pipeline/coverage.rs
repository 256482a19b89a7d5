//! Emptiness guard: rejects drawings with too little ink to be worth scoring.
//!
//! Runs on the canonical raster before feature extraction, so blank canvases
//! get a specific "draw more" rejection instead of a low score.

use super::raster::Raster;

/// A channel below this value (0-255) counts as ink against the white background.
pub const INK_THRESHOLD: u8 = 240;

/// Default minimum fraction of inked pixels.
pub const DEFAULT_MIN_COVERAGE: f32 = 0.05;

/// Drawing rejected for insufficient coverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsufficientCoverage {
    pub coverage: f32,
    pub required: f32,
}

/// True when any channel deviates from the background beyond the tolerance.
pub fn is_ink(pixel: &[u8]) -> bool {
    pixel.iter().any(|&c| c < INK_THRESHOLD)
}

/// Fraction of pixels that differ from the background, in [0, 1].
pub fn check_coverage(raster: &Raster) -> f32 {
    let total = raster.pixel_count();
    if total == 0 {
        return 0.0;
    }
    let inked = raster
        .pixels()
        .chunks_exact(Raster::CHANNELS)
        .filter(|px| is_ink(px))
        .count();
    inked as f32 / total as f32
}

/// Accept the raster when its coverage reaches `min_coverage`.
pub fn accept(raster: &Raster, min_coverage: f32) -> Result<f32, InsufficientCoverage> {
    let coverage = check_coverage(raster);
    if coverage < min_coverage {
        return Err(InsufficientCoverage {
            coverage,
            required: min_coverage,
        });
    }
    Ok(coverage)
}
