//! Feature extraction: canonical raster → fixed-length descriptor.
//!
//! Every extractor is a pure function of the raster for a fixed version, so
//! the same drawing always yields the same descriptor.

use std::path::PathBuf;

use thiserror::Error;

use super::coverage::INK_THRESHOLD;
use super::raster::Raster;

#[derive(Error, Debug, Clone)]
pub enum ExtractorError {
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization: {0}")]
    ModelInit(String),

    #[error("Model did not become ready within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Feature extraction failed: {0}")]
    Extraction(String),
}

/// Fixed-length numeric summary of a raster.
///
/// Only descriptors with the same `version` are comparable.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    version: String,
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(version: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            version: version.into(),
            values,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Feature extractor abstraction.
pub trait FeatureExtractor: Send + Sync {
    /// Identifies the extractor and its parameters.
    fn version(&self) -> &str;
    fn dimension(&self) -> usize;
    fn extract(&self, raster: &Raster) -> Result<Descriptor, ExtractorError>;
}

/// Normalize a vector in-place and return whether the norm was non-zero.
pub fn normalize_l2_in_place(values: &mut [f32]) -> bool {
    let sum: f32 = values.iter().map(|v| v * v).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let norm = sum.sqrt();
    for value in values {
        *value /= norm;
    }
    true
}

// ═══════════════════════════════════════════════════════════
// InkGridExtractor
// ═══════════════════════════════════════════════════════════

/// Default grid side for `InkGridExtractor`.
pub const DEFAULT_GRID: usize = 16;

/// Classical shape descriptor: stroke outlines pooled on a coarse grid.
///
/// 1. Ink intensity per pixel (`1 - luma/255`, background forced to 0).
/// 2. Crop to a square around the ink bounding box, so where and how large
///    the character sits on the canvas does not dominate.
/// 3. Keep only outline pixels: inked pixels with a background neighbour
///    inside the canvas. Solid fills contribute nothing but their edges.
/// 4. Sum outline ink into `grid x grid` cells, then a 3x3 box blur so strokes
///    a cell away from the reference still overlap.
/// 5. Subtract the cell mean and L2-normalize, so cosine similarity measures
///    where the strokes are rather than how much ink there is. A raster with
///    no outline (blank, or inked edge to edge) yields the zero vector.
pub struct InkGridExtractor {
    grid: usize,
    version: String,
}

impl Default for InkGridExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

impl InkGridExtractor {
    pub fn new(grid: usize) -> Self {
        let grid = grid.max(1);
        Self {
            grid,
            version: format!("ink_outline_v2__{grid}x{grid}__centered_l2"),
        }
    }
}

impl FeatureExtractor for InkGridExtractor {
    fn version(&self) -> &str {
        &self.version
    }

    fn dimension(&self) -> usize {
        self.grid * self.grid
    }

    fn extract(&self, raster: &Raster) -> Result<Descriptor, ExtractorError> {
        let (w, h) = (raster.width() as usize, raster.height() as usize);
        let ink: Vec<f32> = raster
            .pixels()
            .chunks_exact(Raster::CHANNELS)
            .map(ink_intensity)
            .collect();

        let mut cells = vec![0.0f32; self.dimension()];
        if let Some(bbox) = ink_bounding_box(&ink, w, h) {
            let (x0, y0, side) = bbox.square();
            for y in bbox.top..=bbox.bottom {
                for x in bbox.left..=bbox.right {
                    let value = ink[y * w + x];
                    if value == 0.0 || !is_outline(&ink, w, h, x, y) {
                        continue;
                    }
                    let cx = cell_index(x as i64 - x0, side, self.grid);
                    let cy = cell_index(y as i64 - y0, side, self.grid);
                    cells[cy * self.grid + cx] += value;
                }
            }
        }

        let mut values = box_blur(&cells, self.grid);
        subtract_mean(&mut values);
        normalize_l2_in_place(&mut values);
        Ok(Descriptor::new(self.version.clone(), values))
    }
}

fn ink_intensity(px: &[u8]) -> f32 {
    if px.iter().all(|&c| c >= INK_THRESHOLD) {
        return 0.0;
    }
    let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    (1.0 - luma / 255.0).clamp(0.0, 1.0)
}

/// Inked pixel touching background. Neighbours outside the canvas do not
/// count, so ink running off the edge has no outline there.
fn is_outline(ink: &[f32], w: usize, h: usize, x: usize, y: usize) -> bool {
    (x > 0 && ink[y * w + x - 1] == 0.0)
        || (x + 1 < w && ink[y * w + x + 1] == 0.0)
        || (y > 0 && ink[(y - 1) * w + x] == 0.0)
        || (y + 1 < h && ink[(y + 1) * w + x] == 0.0)
}

/// Centre on the mean. A vector with no variation left becomes exactly zero
/// instead of rounding noise.
fn subtract_mean(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let energy: f32 = values.iter().map(|v| v * v).sum();
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    for value in values.iter_mut() {
        *value -= mean;
    }
    let residual: f32 = values.iter().map(|v| v * v).sum();
    if residual <= energy * 1e-8 {
        values.fill(0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    left: usize,
    top: usize,
    right: usize,
    bottom: usize,
}

impl BoundingBox {
    /// Square region (origin x, origin y, side) centered on the box.
    fn square(&self) -> (i64, i64, usize) {
        let bw = self.right - self.left + 1;
        let bh = self.bottom - self.top + 1;
        let side = bw.max(bh);
        let x0 = self.left as i64 - ((side - bw) / 2) as i64;
        let y0 = self.top as i64 - ((side - bh) / 2) as i64;
        (x0, y0, side)
    }
}

fn ink_bounding_box(ink: &[f32], w: usize, h: usize) -> Option<BoundingBox> {
    let mut bbox: Option<BoundingBox> = None;
    for y in 0..h {
        for x in 0..w {
            if ink[y * w + x] == 0.0 {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox {
                    left: x,
                    top: y,
                    right: x,
                    bottom: y,
                },
                Some(b) => BoundingBox {
                    left: b.left.min(x),
                    top: b.top.min(y),
                    right: b.right.max(x),
                    bottom: b.bottom.max(y),
                },
            });
        }
    }
    bbox
}

fn cell_index(offset: i64, side: usize, grid: usize) -> usize {
    let offset = offset.max(0) as usize;
    (offset * grid / side.max(1)).min(grid - 1)
}

fn box_blur(cells: &[f32], grid: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; cells.len()];
    for y in 0..grid {
        for x in 0..grid {
            let mut sum = 0.0f32;
            for ny in y.saturating_sub(1)..(y + 2).min(grid) {
                for nx in x.saturating_sub(1)..(x + 2).min(grid) {
                    sum += cells[ny * grid + nx];
                }
            }
            out[y * grid + x] = sum;
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════
// PerceptualHashExtractor
// ═══════════════════════════════════════════════════════════

/// DoubleGradient perceptual hash (16x16) expanded to a ±1 descriptor.
///
/// Uses img_hash's re-exported image crate for compatibility.
pub struct PerceptualHashExtractor {
    dimension: usize,
}

impl Default for PerceptualHashExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptualHashExtractor {
    pub const VERSION: &'static str = "phash_double_gradient_16x16";

    pub fn new() -> Self {
        let probe =
            img_hash::image::RgbImage::from_pixel(16, 16, img_hash::image::Rgb([255, 255, 255]));
        let dimension = Self::hasher().hash_image(&probe).as_bytes().len() * 8;
        Self { dimension }
    }

    /// Gradient hashing needs no precomputed DCT state, so a hasher is cheap to build.
    fn hasher() -> img_hash::Hasher {
        img_hash::HasherConfig::new()
            .hash_alg(img_hash::HashAlg::DoubleGradient)
            .hash_size(16, 16)
            .to_hasher()
    }
}

impl FeatureExtractor for PerceptualHashExtractor {
    fn version(&self) -> &str {
        Self::VERSION
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn extract(&self, raster: &Raster) -> Result<Descriptor, ExtractorError> {
        let hash = Self::hasher().hash_image(raster.image());
        let values: Vec<f32> = hash
            .as_bytes()
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| if byte >> bit & 1 == 1 { 1.0 } else { -1.0 }))
            .collect();
        if values.len() != self.dimension {
            return Err(ExtractorError::Extraction(format!(
                "hash produced {} bits, expected {}",
                values.len(),
                self.dimension
            )));
        }
        Ok(Descriptor::new(Self::VERSION, values))
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX Extractor, behind the `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{normalize_l2_in_place, Descriptor, ExtractorError, FeatureExtractor};
    use crate::pipeline::raster::Raster;
    use image::imageops::FilterType;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Square input side expected by the embedding model.
    const INPUT_SIZE: u32 = 224;
    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// Image embedding model run through ONNX Runtime.
    ///
    /// Requires `model.onnx` in the model directory: one `[1, 3, 224, 224]`
    /// float input, first output flattened as the embedding.
    ///
    /// Uses interior mutability (Mutex) because ort::Session::run requires `&mut self`.
    pub struct OnnxExtractor {
        session: Mutex<Session>,
        version: String,
        dimension: usize,
    }

    impl OnnxExtractor {
        pub fn load(model_dir: &Path) -> Result<Self, ExtractorError> {
            let model_path = model_dir.join("model.onnx");
            if !model_path.exists() {
                return Err(ExtractorError::ModelNotFound(model_path));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| ExtractorError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| ExtractorError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| ExtractorError::ModelInit(format!("ONNX load failed: {e}")))?;

            let dir_name = model_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model".into());

            let mut extractor = Self {
                session: Mutex::new(session),
                version: format!("onnx__{dir_name}"),
                dimension: 0,
            };

            // Warm-up run on a blank canvas validates the model and fixes the dimension
            let blank = Raster::from_rgb(INPUT_SIZE, INPUT_SIZE, vec![255; (INPUT_SIZE * INPUT_SIZE * 3) as usize])
                .map_err(|e| ExtractorError::ModelInit(e.to_string()))?;
            extractor.dimension = extractor.infer(&blank)?.len();

            tracing::info!(
                dimension = extractor.dimension,
                "ONNX extractor loaded from {}",
                model_dir.display()
            );
            Ok(extractor)
        }

        fn infer(&self, raster: &Raster) -> Result<Vec<f32>, ExtractorError> {
            use ort::value::TensorRef;

            let resized = if raster.width() == INPUT_SIZE && raster.height() == INPUT_SIZE {
                raster.image().clone()
            } else {
                image::imageops::resize(raster.image(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            };

            let side = INPUT_SIZE as usize;
            let mut input = ndarray::Array4::<f32>::zeros((1, 3, side, side));
            for (x, y, px) in resized.enumerate_pixels() {
                for c in 0..3 {
                    input[[0, c, y as usize, x as usize]] = (px.0[c] as f32 / 255.0 - MEAN[c]) / STD[c];
                }
            }

            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| ExtractorError::Extraction(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| ExtractorError::Extraction("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| ExtractorError::Extraction(format!("ONNX inference failed: {e}")))?;

            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::Extraction(format!("Output extraction: {e}")))?;

            let mut values = data.to_vec();
            if self.dimension != 0 && values.len() != self.dimension {
                return Err(ExtractorError::Extraction(format!(
                    "Unexpected output length {}, expected {}",
                    values.len(),
                    self.dimension
                )));
            }
            normalize_l2_in_place(&mut values);
            Ok(values)
        }
    }

    impl FeatureExtractor for OnnxExtractor {
        fn version(&self) -> &str {
            &self.version
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn extract(&self, raster: &Raster) -> Result<Descriptor, ExtractorError> {
            Ok(Descriptor::new(self.version.clone(), self.infer(raster)?))
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxExtractor;
