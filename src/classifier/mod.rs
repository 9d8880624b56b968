mod bert;
mod error;
mod onnx;
mod utils;

pub use bert::{load_bert_config, BertMultiLabel, CandleClassifier};
pub use error::ClassifierError;
pub use onnx::OnnxClassifier;
pub use utils::sigmoid;
pub(crate) use utils::sigmoid_all;

use crate::bundle::{BundleLayout, WeightsFormat};
use crate::runtime::RuntimeConfig;

/// A fine-tuned model that maps one text to one raw score per label.
///
/// Implementations own their tokenizer and truncate input to the length the
/// model was trained with. Scores are logits; callers apply the sigmoid.
pub trait SequenceClassifier: Send + Sync {
    /// Width of every logits vector this model returns.
    fn num_labels(&self) -> usize;

    /// Runs a single forward pass for `text`.
    fn logits(&self, text: &str) -> Result<Vec<f32>, ClassifierError>;

    /// Short name of the runtime, used in logs.
    fn backend(&self) -> &'static str {
        "custom"
    }
}

/// Opens the weights in `layout` with the runtime matching their format.
pub fn load_classifier(
    layout: &BundleLayout,
    format: WeightsFormat,
    num_labels: usize,
    runtime: &RuntimeConfig,
) -> Result<Box<dyn SequenceClassifier>, ClassifierError> {
    match format {
        WeightsFormat::Safetensors => Ok(Box::new(CandleClassifier::from_bundle(layout, num_labels)?)),
        WeightsFormat::Onnx => Ok(Box::new(OnnxClassifier::from_bundle(layout, num_labels, runtime)?)),
    }
}
