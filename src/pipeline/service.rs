//! Assessment orchestrator: one submission in, one recorded result out.
//!
//! Order matters for atomicity. Everything that can reject the submission
//! (unknown target, decode, coverage, extractor availability, scoring) runs
//! before `ResultStore::record`, which is the only mutation. A request either
//! records exactly one assessment or fails without touching the store.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::{loader_for, SharedExtractor};
use super::coverage;
use super::grading;
use super::raster::{RasterInput, RasterNormalizer};
use super::references::ReferenceCache;
use super::scorer::{CosineSimilarity, SimilarityScorer};
use super::{AssessmentError, ErrorKind};
use crate::catalog::TargetCatalog;
use crate::config::ServiceConfig;
use crate::models::{Assessment, Grade, NewAssessment, Target};
use crate::store::ResultStore;

/// A drawing submitted against one target.
#[derive(Debug, Clone)]
pub struct Submission {
    pub target_id: String,
    pub drawing: RasterInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub id: Uuid,
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
}

pub struct AssessmentService {
    normalizer: RasterNormalizer,
    min_coverage: f32,
    extractor: Arc<SharedExtractor>,
    scorer: Arc<dyn SimilarityScorer>,
    catalog: Arc<TargetCatalog>,
    references: Arc<ReferenceCache>,
    store: Arc<dyn ResultStore>,
}

impl AssessmentService {
    /// Service with the default canonical size, coverage threshold and scorer.
    pub fn new(
        catalog: Arc<TargetCatalog>,
        extractor: Arc<SharedExtractor>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            normalizer: RasterNormalizer::default(),
            min_coverage: coverage::DEFAULT_MIN_COVERAGE,
            extractor,
            scorer: Arc::new(CosineSimilarity),
            catalog,
            references: Arc::new(ReferenceCache::new()),
            store,
        }
    }

    /// Service wired from config; the extractor loads lazily on first use.
    pub fn from_config(
        config: &ServiceConfig,
        catalog: Arc<TargetCatalog>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let extractor = Arc::new(SharedExtractor::new(
            loader_for(config),
            config.model_load_timeout(),
        ));
        Self::new(catalog, extractor, store)
            .with_normalizer(RasterNormalizer::new(config.canonical_size))
            .with_min_coverage(config.min_coverage)
    }

    pub fn with_normalizer(mut self, normalizer: RasterNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Out-of-range thresholds clamp into [0, 1]; NaN keeps the default.
    pub fn with_min_coverage(mut self, min_coverage: f32) -> Self {
        self.min_coverage = if min_coverage.is_nan() {
            coverage::DEFAULT_MIN_COVERAGE
        } else {
            min_coverage.clamp(0.0, 1.0)
        };
        self
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn extractor(&self) -> &Arc<SharedExtractor> {
        &self.extractor
    }

    /// Assess a drawing and record the result.
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionOutcome, AssessmentError> {
        let result = self.run(submission).await;
        if let Err(e) = &result {
            match e.kind() {
                ErrorKind::InvalidInput | ErrorKind::NotFound => {
                    debug!(code = e.code(), error = %e, "Submission rejected")
                }
                ErrorKind::Transient => warn!(code = e.code(), error = %e, "Submission deferred"),
                ErrorKind::Defect => error!(code = e.code(), error = %e, "Assessment failed"),
            }
        }
        result
    }

    async fn run(&self, submission: Submission) -> Result<SubmissionOutcome, AssessmentError> {
        let Submission { target_id, drawing } = submission;
        let target = self
            .catalog
            .get(&target_id)
            .cloned()
            .ok_or(AssessmentError::UnknownTarget(target_id))?;

        // Decode and coverage guard
        let normalizer = self.normalizer.clone();
        let min_coverage = self.min_coverage;
        let (raster, coverage) = blocking(move || {
            let raster = normalizer.normalize(&drawing)?;
            let coverage = coverage::accept(&raster, min_coverage)?;
            Ok((raster, coverage))
        })
        .await?;
        debug!(target_id = %target.id, coverage, "Drawing accepted by coverage guard");

        let extractor = self
            .extractor
            .get()
            .await
            .map_err(AssessmentError::ModelUnavailable)?;

        // Extract, compare, grade, record
        let normalizer = self.normalizer.clone();
        let scorer = self.scorer.clone();
        let references = self.references.clone();
        let store = self.store.clone();
        blocking(move || {
            let descriptor = extractor
                .extract(&raster)
                .map_err(AssessmentError::Extraction)?;
            let reference = references.get_or_compute(&target, extractor.as_ref(), &normalizer)?;
            let raw = scorer.similarity(&descriptor, &reference)?;

            let (score, grade) = grading::normalize(raw);
            let feedback = grading::feedback(grade, &target.name);
            let drawing_png = raster
                .to_png()
                .map_err(|e| AssessmentError::Internal(e.to_string()))?;

            let id = store.record(NewAssessment {
                target_id: target.id.clone(),
                score,
                grade,
                feedback: feedback.clone(),
                drawing_png,
            })?;
            info!(
                %id,
                target_id = %target.id,
                raw,
                score,
                grade = %grade,
                extractor = extractor.version(),
                "Drawing assessed"
            );
            Ok(SubmissionOutcome {
                id,
                score,
                grade,
                feedback,
            })
        })
        .await
    }

    /// Look up a recorded assessment.
    pub async fn get(&self, id: Uuid) -> Result<Assessment, AssessmentError> {
        let store = self.store.clone();
        blocking(move || Ok(store.get(&id)?)).await
    }

    /// Look up a recorded assessment together with its target.
    pub async fn get_with_target(
        &self,
        id: Uuid,
    ) -> Result<(Assessment, Option<Target>), AssessmentError> {
        let assessment = self.get(id).await?;
        let target = self.catalog.get(&assessment.target_id).cloned();
        Ok((assessment, target))
    }

    /// Extractor readiness, for health reporting.
    pub fn extractor_ready(&self) -> bool {
        self.extractor.is_ready()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, AssessmentError>
where
    F: FnOnce() -> Result<T, AssessmentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AssessmentError::Internal(format!("blocking task failed: {e}")))?
}
