use std::fs;
use std::path::Path;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};

use super::error::ClassifierError;
use super::SequenceClassifier;
use crate::bundle::{BundleLayout, WeightsFormat};
use crate::encoding::{TextEncoder, TokenizedBatch, MAX_SEQUENCE_LENGTH};

/// BERT encoder with the pooler and a linear multi-label head, laid out
/// under the same variable names as a `BertForSequenceClassification`
/// checkpoint (`bert.*`, `bert.pooler.dense.*`, `classifier.*`).
pub struct BertMultiLabel {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    num_labels: usize,
}

impl BertMultiLabel {
    pub fn load(vb: VarBuilder, config: &BertConfig, num_labels: usize) -> candle_core::Result<Self> {
        let bert = BertModel::load(vb.pp("bert"), config)?;
        let pooler = linear(config.hidden_size, config.hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(config.hidden_size, num_labels, vb.pp("classifier"))?;
        Ok(Self {
            bert,
            pooler,
            classifier,
            num_labels,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Returns `[batch, num_labels]` logits for `[batch, seq_len]` inputs.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let hidden = self.bert.forward(input_ids, token_type_ids, Some(attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        self.classifier.forward(&pooled)
    }

    /// Runs a stacked batch through the model.
    pub fn forward_batch(&self, batch: &TokenizedBatch, device: &Device) -> candle_core::Result<Tensor> {
        let shape = (batch.rows, batch.seq_len);
        let input_ids = Tensor::from_slice(&batch.input_ids, shape, device)?;
        let token_type_ids = Tensor::from_slice(&batch.token_type_ids, shape, device)?;
        let attention_mask = Tensor::from_slice(&batch.attention_mask, shape, device)?;
        self.forward(&input_ids, &token_type_ids, &attention_mask)
    }
}

/// Reads a Hugging Face BERT `config.json`.
pub fn load_bert_config<P: AsRef<Path>>(path: P) -> Result<BertConfig, ClassifierError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        ClassifierError::ModelError(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        ClassifierError::ModelError(format!("Failed to parse config {}: {}", path.display(), e))
    })
}

/// Candle backend serving a bundle with `model.safetensors` weights.
pub struct CandleClassifier {
    model: BertMultiLabel,
    encoder: TextEncoder,
    device: Device,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<CandleClassifier>();
    }
};

impl CandleClassifier {
    pub fn from_bundle(layout: &BundleLayout, num_labels: usize) -> Result<Self, ClassifierError> {
        let config = load_bert_config(layout.config())?;
        let encoder = TextEncoder::from_file(layout.tokenizer(), MAX_SEQUENCE_LENGTH)?;
        let device = Device::cuda_if_available(0)?;

        let weights = layout.weights(WeightsFormat::Safetensors);
        // SAFETY: the weights file is treated as read-only for the lifetime of the process.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, &device) }
            .map_err(|e| {
                ClassifierError::ModelError(format!("Failed to load weights {}: {}", weights.display(), e))
            })?;
        let model = BertMultiLabel::load(vb, &config, num_labels).map_err(|e| {
            ClassifierError::ModelError(format!(
                "Weights {} do not match a {}-label BERT classifier: {}",
                weights.display(),
                num_labels,
                e
            ))
        })?;

        log::info!(
            "Loaded BERT classifier ({} layers, hidden size {}, {} labels) on {:?}",
            config.num_hidden_layers,
            config.hidden_size,
            num_labels,
            device
        );

        Ok(Self { model, encoder, device })
    }
}

impl SequenceClassifier for CandleClassifier {
    fn num_labels(&self) -> usize {
        self.model.num_labels()
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        let example = self.encoder.encode(text)?;
        let batch = TokenizedBatch::stack([&example])?;
        let logits = self.model.forward_batch(&batch, &self.device)?;
        Ok(logits.squeeze(0)?.to_vec1::<f32>()?)
    }

    fn backend(&self) -> &'static str {
        "candle"
    }
}
