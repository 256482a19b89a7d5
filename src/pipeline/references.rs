//! Per-target reference descriptors, computed once and reused.
//!
//! Keyed by target id and extractor version, so swapping the extractor never
//! compares against a stale descriptor. Each key has its own slot lock:
//! concurrent first requests for one target wait for a single computation,
//! requests for other targets are not blocked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::extractor::{Descriptor, FeatureExtractor};
use super::raster::{RasterInput, RasterNormalizer};
use super::AssessmentError;
use crate::catalog;
use crate::models::Target;

type Slot = Arc<Mutex<Option<Arc<Descriptor>>>>;

#[derive(Default)]
pub struct ReferenceCache {
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor for `target`, computing it on first use. Blocking.
    pub fn get_or_compute(
        &self,
        target: &Target,
        extractor: &dyn FeatureExtractor,
        normalizer: &RasterNormalizer,
    ) -> Result<Arc<Descriptor>, AssessmentError> {
        let slot = self.slot(&target.id, extractor.version())?;
        let mut guard = slot
            .lock()
            .map_err(|_| AssessmentError::Internal("reference slot lock poisoned".into()))?;
        if let Some(descriptor) = guard.as_ref() {
            return Ok(descriptor.clone());
        }

        let descriptor = Arc::new(compute(target, extractor, normalizer)?);
        debug!(
            target_id = %target.id,
            version = extractor.version(),
            "Reference descriptor computed"
        );
        *guard = Some(descriptor.clone());
        Ok(descriptor)
    }

    /// Number of descriptors computed so far.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .values()
                    .filter(|slot| slot.lock().map(|s| s.is_some()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, target_id: &str, version: &str) -> Result<Slot, AssessmentError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| AssessmentError::Internal("reference cache lock poisoned".into()))?;
        Ok(slots
            .entry((target_id.to_string(), version.to_string()))
            .or_default()
            .clone())
    }
}

fn compute(
    target: &Target,
    extractor: &dyn FeatureExtractor,
    normalizer: &RasterNormalizer,
) -> Result<Descriptor, AssessmentError> {
    let reference_error = |reason: String| AssessmentError::Reference {
        target_id: target.id.clone(),
        reason,
    };

    let bytes = catalog::reference_bytes(target).map_err(|e| reference_error(e.to_string()))?;
    let raster = normalizer
        .normalize(&RasterInput::Encoded(bytes))
        .map_err(|e| reference_error(e.to_string()))?;
    extractor
        .extract(&raster)
        .map_err(|e| reference_error(e.to_string()))
}
