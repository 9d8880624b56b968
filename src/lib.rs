//! Multi-label emotion classification over the GoEmotions taxonomy.
//!
//! The crate covers the whole lifecycle of the model:
//!
//! - [`dataset`] and [`encoding`] turn GoEmotions splits into padded token
//!   batches with multi-hot targets,
//! - [`training`] fine-tunes a pretrained BERT encoder with a linear
//!   classification head and exports a model bundle,
//! - [`service`] loads a bundle lazily and scores texts over HTTP.
//!
//! ```no_run
//! use std::sync::Arc;
//! use emotion_classifier::runtime::RuntimeConfig;
//! use emotion_classifier::service::{PredictRequest, ServiceContext};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let context = Arc::new(ServiceContext::with_artifacts("./model", RuntimeConfig::default()));
//! let response = context.predict(PredictRequest::new("I am so happy today!")).await?;
//! for score in &response.top {
//!     println!("{}: {:.3}", score.label, score.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod bundle;
pub mod classifier;
pub mod dataset;
pub mod encoding;
pub mod labels;
pub mod metrics;
pub mod model_manager;
pub mod runtime;
pub mod service;
pub mod stats;
pub mod training;

pub use classifier::{ClassifierError, SequenceClassifier};
pub use labels::LabelVocabulary;
pub use metrics::{compute_metrics, EvalMetrics};
pub use service::{PredictRequest, PredictResponse, ServiceContext};
pub use training::{Trainer, TrainingConfig};

pub fn init_logger() {
    env_logger::init();
}
