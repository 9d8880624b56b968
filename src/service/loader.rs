use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bundle::BundleLayout;
use crate::classifier::{load_classifier, ClassifierError, SequenceClassifier};
use crate::labels::{LabelError, LabelVocabulary};
use crate::runtime::RuntimeConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("MODEL_DIR does not exist: {0}. Copy your exported model folder there or set the MODEL_DIR env var.")]
    ModelDirMissing(PathBuf),
    #[error("Missing label_names.json in {0}. Make sure it was exported by training.")]
    LabelsMissing(PathBuf),
    #[error("Missing tokenizer.json in {0}")]
    TokenizerMissing(PathBuf),
    #[error("No model.safetensors or model.onnx in {0}")]
    WeightsMissing(PathBuf),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Model loading task failed: {0}")]
    Task(String),
}

/// Everything the prediction handler needs, materialized from one bundle.
pub struct LoadedBundle {
    pub model_dir: PathBuf,
    pub labels: LabelVocabulary,
    pub classifier: Box<dyn SequenceClassifier>,
}

impl fmt::Debug for LoadedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedBundle")
            .field("model_dir", &self.model_dir)
            .field("labels", &self.labels.len())
            .field("backend", &self.classifier.backend())
            .finish()
    }
}

/// Turns a bundle directory into a [`LoadedBundle`]. Called from a blocking
/// thread.
pub trait BundleLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<LoadedBundle, LoadError>;
}

/// Loads bundles written by the training pipeline, or any bundle with a
/// `model.onnx` export of a sequence classifier.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoader {
    runtime: RuntimeConfig,
}

impl ArtifactLoader {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }
}

impl BundleLoader for ArtifactLoader {
    fn load(&self, model_dir: &Path) -> Result<LoadedBundle, LoadError> {
        if !model_dir.is_dir() {
            return Err(LoadError::ModelDirMissing(model_dir.to_path_buf()));
        }
        let layout = BundleLayout::new(model_dir);

        if !layout.label_names().is_file() {
            return Err(LoadError::LabelsMissing(model_dir.to_path_buf()));
        }
        let labels = LabelVocabulary::load(layout.label_names())?;

        if !layout.tokenizer().is_file() {
            return Err(LoadError::TokenizerMissing(model_dir.to_path_buf()));
        }
        let format = layout
            .weights_format()
            .ok_or_else(|| LoadError::WeightsMissing(model_dir.to_path_buf()))?;

        let classifier = load_classifier(&layout, format, labels.len(), &self.runtime)?;
        log::info!(
            "Loaded {} backend with {} labels from {:?}",
            classifier.backend(),
            labels.len(),
            model_dir
        );

        Ok(LoadedBundle {
            model_dir: model_dir.to_path_buf(),
            labels,
            classifier,
        })
    }
}

/// Lifecycle of the model inside one service process.
///
/// `Loaded` is final. `Failed` is not: the next request retries the load
/// from scratch, with no backoff, and the attempt counter grows.
#[derive(Debug, Clone)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded(Arc<LoadedBundle>),
    Failed { error: String, attempts: u32 },
}

impl LoadState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Holds the bundle and serializes its lazy load.
pub struct ModelSlot {
    model_dir: PathBuf,
    loader: Arc<dyn BundleLoader>,
    state: Mutex<LoadState>,
    load_lock: tokio::sync::Mutex<()>,
}

impl ModelSlot {
    pub fn new(model_dir: impl Into<PathBuf>, loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            model_dir: model_dir.into(),
            loader,
            state: Mutex::new(LoadState::Unloaded),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn state(&self) -> LoadState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn loaded(&self) -> Option<Arc<LoadedBundle>> {
        match &*self.lock_state() {
            LoadState::Loaded(bundle) => Some(Arc::clone(bundle)),
            _ => None,
        }
    }

    /// Returns the bundle, loading it first if needed. Concurrent callers
    /// wait for a single load instead of starting their own.
    pub async fn get(&self) -> Result<Arc<LoadedBundle>, LoadError> {
        if let Some(bundle) = self.loaded() {
            return Ok(bundle);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(bundle) = self.loaded() {
            return Ok(bundle);
        }

        let previous_attempts = {
            let mut state = self.lock_state();
            let attempts = match &*state {
                LoadState::Failed { attempts, .. } => *attempts,
                _ => 0,
            };
            *state = LoadState::Loading;
            attempts
        };
        log::info!("Loading model from {:?}", self.model_dir);

        let loader = Arc::clone(&self.loader);
        let model_dir = self.model_dir.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&model_dir))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))
            .and_then(|result| result);

        let mut state = self.lock_state();
        match result {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *state = LoadState::Loaded(Arc::clone(&bundle));
                Ok(bundle)
            }
            Err(e) => {
                let attempts = previous_attempts + 1;
                log::error!("Model load attempt {} failed: {}", attempts, e);
                *state = LoadState::Failed {
                    error: e.to_string(),
                    attempts,
                };
                Err(e)
            }
        }
    }
}
