//! Result store: the single place assessments are written and read back.
//!
//! Only two operations exist. `record` issues a fresh identifier and writes
//! the assessment; `get` reads it. There is no update or delete, so a recorded
//! assessment never changes.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryResultStore;
pub use sqlite::SqliteResultStore;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Assessment, NewAssessment};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Assessment not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Corrupt stored value for {field}: {value}")]
    CorruptValue { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Append-only assessment storage.
pub trait ResultStore: Send + Sync {
    /// Store the assessment under a fresh identifier and return it.
    fn record(&self, assessment: NewAssessment) -> Result<Uuid, StoreError>;

    /// Fetch a recorded assessment. `NotFound` for identifiers never issued.
    fn get(&self, id: &Uuid) -> Result<Assessment, StoreError>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every `ResultStore` backing must show.

    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::models::Grade;

    pub fn sample(target: &str, score: u8) -> NewAssessment {
        NewAssessment {
            target_id: target.into(),
            score,
            grade: crate::pipeline::grading::grade_for(score),
            feedback: format!("feedback for {target} at {score}"),
            drawing_png: vec![0x89, b'P', b'N', b'G', score],
        }
    }

    pub fn round_trips(store: &dyn ResultStore) {
        let new = sample("character1", 73);
        let before = chrono::Utc::now();
        let id = store.record(new.clone()).unwrap();

        let stored = store.get(&id).unwrap();
        assert_eq!(stored.id, id);
        assert!(stored.matches(&new));
        assert_eq!(stored.grade, Grade::B);
        assert!(stored.created_at >= before - chrono::Duration::seconds(1));
    }

    pub fn unknown_id_is_not_found(store: &dyn ResultStore) {
        store.record(sample("character1", 10)).unwrap();
        let missing = Uuid::new_v4();
        assert!(matches!(store.get(&missing), Err(StoreError::NotFound(id)) if id == missing));
    }

    pub fn ids_are_fresh(store: &dyn ResultStore) {
        let a = store.record(sample("character1", 50)).unwrap();
        let b = store.record(sample("character1", 50)).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap().score, 50);
        assert_eq!(store.get(&b).unwrap().score, 50);
    }

    pub fn concurrent_records_are_distinct(store: Arc<dyn ResultStore>) {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| {
                            let new = sample(&format!("target{t}"), ((t * PER_THREAD + i) % 101) as u8);
                            let id = store.record(new.clone()).unwrap();
                            (id, new)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for (id, new) in handle.join().unwrap() {
                assert!(ids.insert(id), "duplicate id {id}");
                assert!(store.get(&id).unwrap().matches(&new));
            }
        }
        assert_eq!(ids.len(), THREADS * PER_THREAD);
    }
}
