//! Process-wide feature extractor, loaded once on first use.
//!
//! `SharedExtractor` owns the loader and the load state. The first caller
//! starts a load; callers arriving while it runs subscribe to the same
//! attempt and all receive its one outcome. A failed attempt resets the state
//! so only a later request starts a new load. Callers wait at most `timeout`;
//! the load itself keeps running in a detached task, so a caller timing out
//! never cancels it and never starts another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::extractor::{ExtractorError, FeatureExtractor, InkGridExtractor, PerceptualHashExtractor};
use crate::config::{ExtractorKind, ServiceConfig};

/// Builds the extractor. Runs on the blocking pool.
pub type ExtractorLoader =
    Arc<dyn Fn() -> Result<Arc<dyn FeatureExtractor>, ExtractorError> + Send + Sync>;

type LoadOutcome = Option<Result<Arc<dyn FeatureExtractor>, ExtractorError>>;

enum LoadState {
    Idle,
    Loading(watch::Receiver<LoadOutcome>),
    Ready(Arc<dyn FeatureExtractor>),
}

pub struct SharedExtractor {
    state: Arc<Mutex<LoadState>>,
    loader: ExtractorLoader,
    timeout: Duration,
    attempts: Arc<AtomicUsize>,
}

impl SharedExtractor {
    pub fn new(loader: ExtractorLoader, timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoadState::Idle)),
            loader,
            timeout,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Already-loaded extractor (tests, eager startup).
    pub fn ready(extractor: Arc<dyn FeatureExtractor>) -> Self {
        let loaded = extractor.clone();
        Self {
            state: Arc::new(Mutex::new(LoadState::Ready(extractor))),
            loader: Arc::new(move || Ok(loaded.clone())),
            timeout: Duration::from_secs(1),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*lock(&self.state), LoadState::Ready(_))
    }

    /// Number of load attempts started so far.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Get the extractor, loading it if needed.
    pub async fn get(&self) -> Result<Arc<dyn FeatureExtractor>, ExtractorError> {
        let mut outcome = {
            let mut state = lock(&self.state);
            let in_flight = match &*state {
                LoadState::Ready(extractor) => return Ok(extractor.clone()),
                LoadState::Loading(rx) => Some(rx.clone()),
                LoadState::Idle => None,
            };
            match in_flight {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = watch::channel(None);
                    *state = LoadState::Loading(rx.clone());
                    self.spawn_load(tx);
                    rx
                }
            }
        };

        let waited = tokio::time::timeout(self.timeout, async {
            match outcome.wait_for(Option::is_some).await {
                Ok(done) => (*done).clone(),
                Err(_) => None,
            }
        })
        .await;

        match waited {
            Ok(Some(result)) => result,
            Ok(None) => Err(ExtractorError::ModelInit("load task ended without a result".into())),
            Err(_) => {
                warn!(timeout = ?self.timeout, "Timed out waiting for feature extractor");
                Err(ExtractorError::Timeout(self.timeout))
            }
        }
    }

    fn spawn_load(&self, tx: watch::Sender<LoadOutcome>) {
        let state = self.state.clone();
        let loader = self.loader.clone();
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::spawn(async move {
            info!(attempt, "Loading feature extractor");
            let loaded = match tokio::task::spawn_blocking(move || loader()).await {
                Ok(result) => result,
                Err(e) => Err(ExtractorError::ModelInit(format!("loader task failed: {e}"))),
            };
            match &loaded {
                Ok(extractor) => info!(
                    version = extractor.version(),
                    dimension = extractor.dimension(),
                    "Feature extractor ready"
                ),
                Err(e) => warn!(attempt, error = %e, "Feature extractor failed to load"),
            }

            // State first, so a waiter retrying after a failure starts a fresh load
            *lock(&state) = match &loaded {
                Ok(extractor) => LoadState::Ready(extractor.clone()),
                Err(_) => LoadState::Idle,
            };
            tx.send_replace(Some(loaded));
        });
    }

    /// Start loading in the background without waiting.
    pub fn warm_up(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.get().await;
        });
    }
}

/// The state is only swapped whole, so a poisoned guard is still consistent.
fn lock(state: &Mutex<LoadState>) -> MutexGuard<'_, LoadState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loader for the extractor named in the config.
pub fn loader_for(config: &ServiceConfig) -> ExtractorLoader {
    match config.extractor {
        ExtractorKind::InkGrid => Arc::new(|| Ok(Arc::new(InkGridExtractor::default()) as Arc<dyn FeatureExtractor>)),
        ExtractorKind::PerceptualHash => {
            Arc::new(|| Ok(Arc::new(PerceptualHashExtractor::new()) as Arc<dyn FeatureExtractor>))
        }
        ExtractorKind::Onnx => onnx_loader(config.model_dir.clone()),
    }
}

#[cfg(feature = "onnx-embeddings")]
fn onnx_loader(model_dir: std::path::PathBuf) -> ExtractorLoader {
    use super::extractor::OnnxExtractor;
    Arc::new(move || {
        OnnxExtractor::load(&model_dir).map(|e| Arc::new(e) as Arc<dyn FeatureExtractor>)
    })
}

#[cfg(not(feature = "onnx-embeddings"))]
fn onnx_loader(_model_dir: std::path::PathBuf) -> ExtractorLoader {
    Arc::new(|| {
        Err(ExtractorError::ModelInit(
            "built without the onnx-embeddings feature".into(),
        ))
    })
}
