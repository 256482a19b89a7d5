use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Grade;

/// The persisted outcome of one accepted submission. Never mutated after `record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub target_id: String,
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
    /// Normalized drawing, PNG-encoded.
    pub drawing_png: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields of an assessment; the store adds `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssessment {
    pub target_id: String,
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
    pub drawing_png: Vec<u8>,
}

impl NewAssessment {
    pub(crate) fn into_assessment(self, id: Uuid, created_at: DateTime<Utc>) -> Assessment {
        Assessment {
            id,
            target_id: self.target_id,
            score: self.score,
            grade: self.grade,
            feedback: self.feedback,
            drawing_png: self.drawing_png,
            created_at,
        }
    }
}

impl Assessment {
    /// True when the caller-supplied fields match `new`.
    pub fn matches(&self, new: &NewAssessment) -> bool {
        self.target_id == new.target_id
            && self.score == new.score
            && self.grade == new.grade
            && self.feedback == new.feedback
            && self.drawing_png == new.drawing_png
    }
}
