use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a target's reference drawing comes from.
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    /// Encoded image on disk (PNG, JPEG, ...).
    File(PathBuf),
    /// Encoded image bytes held in memory.
    Bytes(Vec<u8>),
}

/// A selectable character the user is asked to draw.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: String,
    pub name: String,
    /// Public URL of the reference image, as shown to clients.
    pub reference_image_url: String,
    pub reference: ReferenceSource,
}

/// Public catalog entry, `{ id, name, referenceImageUrl }` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub id: String,
    pub name: String,
    pub reference_image_url: String,
}

impl From<&Target> for TargetSummary {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id.clone(),
            name: target.name.clone(),
            reference_image_url: target.reference_image_url.clone(),
        }
    }
}
