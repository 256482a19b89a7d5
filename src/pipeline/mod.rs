pub mod backend;
pub mod coverage;
pub mod extractor;
pub mod grading;
pub mod raster;
pub mod references;
pub mod scorer;
pub mod service;

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use extractor::ExtractorError;
use raster::RasterError;
use scorer::DescriptorMismatch;

pub use service::{AssessmentService, Submission, SubmissionOutcome};

/// How a caller should react to an `AssessmentError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix the input and resubmit.
    InvalidInput,
    /// Retry later with the same input.
    Transient,
    /// Should never happen; logged in full, reported generically.
    Defect,
    /// Lookup of an id that was never issued. A normal answer, not a failure.
    NotFound,
}

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Drawing could not be decoded: {0}")]
    Decode(#[from] RasterError),

    #[error("Drawing is empty: coverage {coverage:.3} below required {required:.3}")]
    EmptySubmission { coverage: f32, required: f32 },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Feature extractor unavailable: {0}")]
    ModelUnavailable(#[source] ExtractorError),

    #[error("Feature extraction failed: {0}")]
    Extraction(#[source] ExtractorError),

    #[error(transparent)]
    DescriptorMismatch(#[from] DescriptorMismatch),

    #[error("Reference for {target_id} unavailable: {reason}")]
    Reference { target_id: String, reason: String },

    #[error("No assessment with id {0}")]
    NotFound(Uuid),

    #[error("Result store: {0}")]
    Store(#[source] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<coverage::InsufficientCoverage> for AssessmentError {
    fn from(e: coverage::InsufficientCoverage) -> Self {
        Self::EmptySubmission {
            coverage: e.coverage,
            required: e.required,
        }
    }
}

impl From<StoreError> for AssessmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl AssessmentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::EmptySubmission { .. } => "EMPTY_SUBMISSION",
            Self::UnknownTarget(_) => "UNKNOWN_TARGET",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::Extraction(_) => "EXTRACTION_FAILED",
            Self::DescriptorMismatch(_) => "DESCRIPTOR_MISMATCH",
            Self::Reference { .. } => "REFERENCE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Store(_) => "STORE_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::EmptySubmission { .. } | Self::UnknownTarget(_) => {
                ErrorKind::InvalidInput
            }
            Self::ModelUnavailable(_) | Self::Store(_) => ErrorKind::Transient,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Extraction(_)
            | Self::DescriptorMismatch(_)
            | Self::Reference { .. }
            | Self::Internal(_) => ErrorKind::Defect,
        }
    }
}
