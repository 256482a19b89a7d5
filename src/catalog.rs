//! Static catalog of selectable targets.
//!
//! Loaded once at startup from a JSON manifest and never mutated. Reference
//! image paths in the manifest are relative to the manifest's directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::{ReferenceSource, Target, TargetSummary};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Cannot read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Catalog lists no targets")]
    Empty,

    #[error("Duplicate target id: {0}")]
    DuplicateId(String),

    #[error("Reference image for {target_id} not found at {path}")]
    MissingReference { target_id: String, path: PathBuf },

    #[error("Cannot read reference image for {target_id}: {source}")]
    ReferenceRead {
        target_id: String,
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct Manifest {
    targets: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    id: String,
    name: String,
    reference_image_url: String,
    /// File name relative to the manifest directory.
    reference_image: PathBuf,
}

/// Read-only target list, in manifest order.
#[derive(Debug, Clone)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
}

impl TargetCatalog {
    pub fn new(targets: Vec<Target>) -> Result<Self, CatalogError> {
        if targets.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut index = HashMap::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            if index.insert(target.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(target.id.clone()));
            }
        }
        Ok(Self { targets, index })
    }

    /// Load the manifest and check that every reference image exists.
    pub fn load(manifest_path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(manifest_path).map_err(|source| CatalogError::Read {
            path: manifest_path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: manifest_path.to_path_buf(),
                source,
            })?;

        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let targets = manifest
            .targets
            .into_iter()
            .map(|entry| {
                let path = base.join(&entry.reference_image);
                if !path.is_file() {
                    return Err(CatalogError::MissingReference {
                        target_id: entry.id,
                        path,
                    });
                }
                Ok(Target {
                    id: entry.id,
                    name: entry.name,
                    reference_image_url: entry.reference_image_url,
                    reference: ReferenceSource::File(path),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = Self::new(targets)?;
        tracing::info!(
            targets = catalog.len(),
            "Target catalog loaded from {}",
            manifest_path.display()
        );
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.index.get(id).map(|&i| &self.targets[i])
    }

    pub fn summaries(&self) -> Vec<TargetSummary> {
        self.targets.iter().map(TargetSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Encoded bytes of a target's reference image.
pub fn reference_bytes(target: &Target) -> Result<Vec<u8>, CatalogError> {
    match &target.reference {
        ReferenceSource::Bytes(bytes) => Ok(bytes.clone()),
        ReferenceSource::File(path) => {
            std::fs::read(path).map_err(|source| CatalogError::ReferenceRead {
                target_id: target.id.clone(),
                source,
            })
        }
    }
}
