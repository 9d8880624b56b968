use std::collections::HashMap;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;

use super::error::ClassifierError;
use super::SequenceClassifier;
use crate::bundle::{BundleLayout, WeightsFormat};
use crate::encoding::{TextEncoder, TokenizedExample, MAX_SEQUENCE_LENGTH};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// ONNX Runtime backend for bundles whose weights were exported to
/// `model.onnx` by another toolchain.
///
/// The model is expected to:
/// - Accept `input_ids` and `attention_mask`, and optionally `token_type_ids`
///   (all int64, shape `[batch_size, sequence_length]`)
/// - Produce logits of shape `[batch_size, num_labels]` as its first output
#[derive(Debug)]
pub struct OnnxClassifier {
    session: Session,
    encoder: TextEncoder,
    num_labels: usize,
    uses_token_type_ids: bool,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxClassifier>();
    }
};

impl OnnxClassifier {
    pub fn from_bundle(
        layout: &BundleLayout,
        num_labels: usize,
        runtime: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let encoder = TextEncoder::from_file(layout.tokenizer(), MAX_SEQUENCE_LENGTH)?;
        let model_path = layout.weights(WeightsFormat::Onnx);

        let session = create_session_builder(runtime)?
            .commit_from_file(&model_path)
            .map_err(|e| {
                log::error!("Failed to load ONNX model {:?}: {}", model_path, e);
                ClassifierError::ModelError(format!(
                    "Failed to load ONNX model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        Self::validate_model(&session)?;
        let uses_token_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");
        log::info!(
            "Loaded ONNX classifier from {:?} (token_type_ids: {})",
            model_path,
            uses_token_type_ids
        );

        Ok(Self {
            session,
            encoder,
            num_labels,
            uses_token_type_ids,
        })
    }

    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let names: Vec<&str> = session.inputs.iter().map(|input| input.name.as_str()).collect();
        for required in ["input_ids", "attention_mask"] {
            if !names.contains(&required) {
                return Err(ClassifierError::ModelError(format!(
                    "Model is missing the '{}' input (found {:?})",
                    required, names
                )));
            }
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError("Model must have at least 1 output for logits".into()));
        }
        Ok(())
    }

    fn input_array(values: &[u32]) -> Result<Array2<i64>, ClassifierError> {
        Array2::from_shape_vec((1, values.len()), values.iter().map(|&x| x as i64).collect())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input array: {}", e)))
    }

    fn run(&self, example: &TokenizedExample) -> Result<Vec<f32>, ClassifierError> {
        let input_dyn = Self::input_array(&example.input_ids)?.into_dyn();
        let input_ids = input_dyn.as_standard_layout();
        let mask_dyn = Self::input_array(&example.attention_mask)?.into_dyn();
        let attention_mask = mask_dyn.as_standard_layout();
        let types_dyn = Self::input_array(&example.token_type_ids)?.into_dyn();
        let token_type_ids = types_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", Tensor::from_array(&input_ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);
        input_tensors.insert("attention_mask", Tensor::from_array(&attention_mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask tensor: {}", e)))?);
        if self.uses_token_type_ids {
            input_tensors.insert("token_type_ids", Tensor::from_array(&token_type_ids)
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create type tensor: {}", e)))?);
        }

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        if output_tensor.len() != self.num_labels {
            return Err(ClassifierError::PredictionError(format!(
                "Model produced {} scores but the vocabulary has {} labels",
                output_tensor.len(),
                self.num_labels
            )));
        }
        Ok(output_tensor.iter().copied().collect())
    }
}

impl SequenceClassifier for OnnxClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        let example = self.encoder.encode(text)?;
        self.run(&example)
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}
