//! Shared types for the HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::AssessmentService;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<AssessmentService>,
    /// Directory served under `/characters/`, if any.
    pub characters_dir: Option<PathBuf>,
}

impl ApiContext {
    pub fn new(service: Arc<AssessmentService>) -> Self {
        Self {
            service,
            characters_dir: None,
        }
    }

    pub fn with_characters_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.characters_dir = Some(dir.into());
        self
    }
}

/// Fixtures shared by router and server tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use base64::Engine;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    use crate::catalog::TargetCatalog;
    use crate::models::{ReferenceSource, Target};
    use crate::pipeline::backend::{ExtractorLoader, SharedExtractor};
    use crate::pipeline::extractor::{ExtractorError, InkGridExtractor};
    use crate::pipeline::raster::encode_png;
    use crate::store::InMemoryResultStore;

    const SIZE: u32 = 256;

    fn png_data_url(img: &RgbImage) -> String {
        let png = encode_png(img).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    /// Canvas with the top 40% inked.
    pub fn partial_drawing() -> String {
        let rows = (SIZE as f32 * 0.4).ceil() as u32;
        png_data_url(&RgbImage::from_fn(SIZE, SIZE, |_, y| {
            if y < rows {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }))
    }

    pub fn blank_drawing() -> String {
        png_data_url(&RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255])))
    }

    fn catalog() -> Arc<TargetCatalog> {
        let reference = RgbImage::from_fn(SIZE, SIZE, |_, y| {
            if (32..135).contains(&y) {
                Rgb([20, 20, 20])
            } else {
                Rgb([255, 255, 255])
            }
        });
        Arc::new(
            TargetCatalog::new(vec![Target {
                id: "character1".into(),
                name: "Character 1".into(),
                reference_image_url: "/characters/character1.png".into(),
                reference: ReferenceSource::Bytes(encode_png(&reference).unwrap()),
            }])
            .unwrap(),
        )
    }

    fn context_with(extractor: SharedExtractor) -> ApiContext {
        let service = AssessmentService::new(
            catalog(),
            Arc::new(extractor),
            Arc::new(InMemoryResultStore::new()),
        );
        ApiContext::new(Arc::new(service))
    }

    pub fn test_context() -> ApiContext {
        context_with(SharedExtractor::ready(Arc::new(InkGridExtractor::default())))
    }

    /// Context whose extractor never finishes loading in time.
    pub fn unavailable_context() -> ApiContext {
        let loader: ExtractorLoader =
            Arc::new(|| Err(ExtractorError::ModelInit("weights missing".into())));
        context_with(SharedExtractor::new(loader, Duration::from_millis(200)))
    }
}
