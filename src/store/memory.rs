use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use super::{ResultStore, StoreError};
use crate::models::{Assessment, NewAssessment};

/// Process-lifetime store backed by a map. Used for tests and
/// single-process deployments without a database file.
#[derive(Default)]
pub struct InMemoryResultStore {
    assessments: RwLock<HashMap<Uuid, Assessment>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assessments.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for InMemoryResultStore {
    fn record(&self, assessment: NewAssessment) -> Result<Uuid, StoreError> {
        let mut map = self
            .assessments
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;

        // v4 collisions are not expected; an occupied slot just draws again
        loop {
            let id = Uuid::new_v4();
            if let Entry::Vacant(slot) = map.entry(id) {
                slot.insert(assessment.into_assessment(id, Utc::now()));
                tracing::debug!(%id, "Assessment recorded in memory");
                return Ok(id);
            }
        }
    }

    fn get(&self, id: &Uuid) -> Result<Assessment, StoreError> {
        let map = self
            .assessments
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }
}
