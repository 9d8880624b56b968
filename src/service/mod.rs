//! Inference service: lazy bundle loading, scoring and the HTTP surface.

mod http;
mod loader;
mod predict;

pub use http::{router, serve};
pub use loader::{ArtifactLoader, BundleLoader, LoadError, LoadState, LoadedBundle, ModelSlot};
pub use predict::{
    clamp_top_k, predict, rank_scores, LabelScore, PredictRequest, PredictResponse, DEFAULT_THRESHOLD,
    DEFAULT_TOP_K, MAX_TOP_K,
};

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;
use crate::runtime::RuntimeConfig;

pub const MODEL_DIR_ENV: &str = "MODEL_DIR";

/// Returns the bundle directory the service reads from.
pub fn default_model_dir() -> PathBuf {
    // 1. Check environment variable
    if let Ok(path) = env::var(MODEL_DIR_ENV) {
        return PathBuf::from(path);
    }

    // 2. Next to the executable
    if let Some(exe_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        return exe_dir.join("model");
    }

    // 3. Relative to the working directory
    PathBuf::from("model")
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Prediction(#[from] ClassifierError),
    #[error("Prediction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State shared by every request handler.
pub struct ServiceContext {
    slot: ModelSlot,
}

impl ServiceContext {
    pub fn new(model_dir: impl Into<PathBuf>, loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            slot: ModelSlot::new(model_dir, loader),
        }
    }

    /// Context backed by the on-disk bundle loader.
    pub fn with_artifacts(model_dir: impl Into<PathBuf>, runtime: RuntimeConfig) -> Self {
        Self::new(model_dir, Arc::new(ArtifactLoader::new(runtime)))
    }

    pub fn model_dir(&self) -> &Path {
        self.slot.model_dir()
    }

    pub fn load_state(&self) -> LoadState {
        self.slot.state()
    }

    pub async fn bundle(&self) -> Result<Arc<LoadedBundle>, LoadError> {
        self.slot.get().await
    }

    /// Triggers the load if needed and reports whether the model is usable.
    pub async fn health(&self) -> HealthResponse {
        match self.slot.get().await {
            Ok(bundle) => HealthResponse {
                ok: true,
                model_dir: Some(bundle.model_dir.display().to_string()),
                labels: Some(bundle.labels.len()),
                error: None,
            },
            Err(e) => HealthResponse {
                ok: false,
                model_dir: None,
                labels: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<PredictResponse, ServiceError> {
        let bundle = self.slot.get().await?;
        let response = tokio::task::spawn_blocking(move || predict(&bundle, &request))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))??;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dir_env_override() {
        env::set_var(MODEL_DIR_ENV, "/srv/emotion-model");
        assert_eq!(default_model_dir(), PathBuf::from("/srv/emotion-model"));
        env::remove_var(MODEL_DIR_ENV);

        assert!(default_model_dir().ends_with("model"));
    }

    #[test]
    fn test_health_omits_absent_fields() {
        let health = HealthResponse {
            ok: false,
            model_dir: None,
            labels: None,
            error: Some("boom".into()),
        };
        assert_eq!(
            serde_json::to_value(&health).unwrap(),
            serde_json::json!({"ok": false, "error": "boom"})
        );
    }
}
