//! Fine-tuning of a pretrained BERT encoder for multi-label emotion
//! classification.
//!
//! One run:
//! 1. multi-hot encodes every example and tokenizes it to a fixed length
//! 2. loads the pretrained encoder into trainable variables and seeds a new
//!    classification head
//! 3. trains for exactly `epochs` passes with AdamW and binary
//!    cross-entropy on the logits, decaying the learning rate linearly to 0
//! 4. evaluates on the validation split after every epoch
//! 5. exports the final weights, tokenizer, config and label vocabulary
//!
//! No intermediate checkpoints are written. Any error aborts the run before
//! the bundle is committed.

mod export;
mod pretrained;

pub use export::export_bundle;
pub use pretrained::{load_pretrained, PretrainedSummary};

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::bundle::{CONFIG_FILE, SAFETENSORS_FILE, TOKENIZER_FILE};
use crate::classifier::{load_bert_config, BertMultiLabel, ClassifierError};
use crate::dataset::{DatasetError, EmotionDataset, Example};
use crate::encoding::{TextEncoder, TokenizedBatch, TokenizedExample, MAX_SEQUENCE_LENGTH};
use crate::labels::LabelError;
use crate::metrics::{compute_metrics, EvalMetrics, MetricsError};
use crate::model_manager::ModelError;

const LOG_EVERY_STEPS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),
    #[error("Pretrained weights: {0}")]
    Pretrained(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Assets(#[from] ModelError),
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Hyperparameters and output location of one run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub export_dir: PathBuf,
    /// Drives shuffling and head initialization. Two runs with the same
    /// seed and inputs train identically on the CPU.
    pub seed: u64,
    pub max_length: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            batch_size: 32,
            epochs: 2,
            export_dir: PathBuf::from("./exported_emotion_model"),
            seed: rand::random::<u64>() % 1_000_000,
            max_length: MAX_SEQUENCE_LENGTH,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TrainingError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch size must be positive".into()));
        }
        if self.epochs == 0 {
            return Err(TrainingError::InvalidConfig("epoch count must be positive".into()));
        }
        if self.max_length == 0 {
            return Err(TrainingError::InvalidConfig("max length must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub mean_loss: f32,
    pub validation: EvalMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub seed: u64,
    pub epochs: Vec<EpochReport>,
    pub export_dir: PathBuf,
}

/// Token inputs and multi-hot targets of one split, ready for batching.
#[derive(Debug, Clone, Default)]
pub struct PreparedSplit {
    pub inputs: Vec<TokenizedExample>,
    pub targets: Vec<Vec<f32>>,
}

impl PreparedSplit {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn batch(&self, indices: &[usize], device: &Device) -> Result<(TokenizedBatch, Tensor), TrainingError> {
        let batch = TokenizedBatch::stack(indices.iter().map(|&i| &self.inputs[i]))?;
        let num_labels = self.targets.first().map_or(0, Vec::len);
        let flat: Vec<f32> = indices.iter().flat_map(|&i| self.targets[i].iter().copied()).collect();
        let targets = Tensor::from_vec(flat, (indices.len(), num_labels), device)?;
        Ok((batch, targets))
    }
}

/// Multi-hot encodes and tokenizes every example, padding to the encoder's
/// fixed length.
pub fn prepare_split(
    encoder: &TextEncoder,
    examples: &[Example],
    num_labels: usize,
) -> Result<PreparedSplit, TrainingError> {
    let mut split = PreparedSplit::default();
    for example in examples {
        split.targets.push(example.target(num_labels)?);
        split.inputs.push(encoder.encode_padded(&example.text)?);
    }
    Ok(split)
}

/// Drives one fine-tuning run.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        let device = Device::cuda_if_available(0)?;
        Ok(Self { config, device })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fine-tunes the encoder found in `base_model_dir` (`config.json`,
    /// `tokenizer.json`, `model.safetensors`) on `dataset` and exports the
    /// result to the configured directory.
    pub fn train(&self, dataset: &EmotionDataset, base_model_dir: &Path) -> Result<TrainingReport, TrainingError> {
        let started = Instant::now();
        let config = &self.config;
        let num_labels = dataset.num_labels();
        log::info!(
            "Starting run: lr={} batch_size={} epochs={} seed={} labels={} device={:?}",
            config.learning_rate,
            config.batch_size,
            config.epochs,
            config.seed,
            num_labels,
            self.device
        );

        if dataset.train.is_empty() {
            return Err(TrainingError::InvalidConfig("training split is empty".into()));
        }

        let encoder = TextEncoder::from_file(base_model_dir.join(TOKENIZER_FILE), config.max_length)?;
        let train = prepare_split(&encoder, &dataset.train, num_labels)?;
        let validation = prepare_split(&encoder, &dataset.validation, num_labels)?;
        log::info!(
            "Prepared {} training and {} validation examples",
            train.len(),
            validation.len()
        );

        let base_config = base_model_dir.join(CONFIG_FILE);
        let bert_config = load_bert_config(&base_config)?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let model = BertMultiLabel::load(vb, &bert_config, num_labels)?;
        load_pretrained(&varmap, &base_model_dir.join(SAFETENSORS_FILE), &self.device, config.seed)?;

        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let steps_per_epoch = train.len().div_ceil(config.batch_size);
        let total_steps = steps_per_epoch * config.epochs;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut step = 0usize;
        let mut epochs = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0f32;

            for indices in order.chunks(config.batch_size) {
                let (batch, targets) = train.batch(indices, &self.device)?;
                let logits = model.forward_batch(&batch, &self.device)?;
                let loss = loss::binary_cross_entropy_with_logit(&logits, &targets)?;
                optimizer.backward_step(&loss)?;

                step += 1;
                optimizer.set_learning_rate(linear_decay(config.learning_rate, step, total_steps));
                let loss = loss.to_scalar::<f32>()?;
                loss_sum += loss;

                if step % LOG_EVERY_STEPS == 0 {
                    log::info!(
                        "epoch {}/{} step {}/{} loss={:.4} lr={:.2e}",
                        epoch,
                        config.epochs,
                        step,
                        total_steps,
                        loss,
                        optimizer.learning_rate()
                    );
                } else {
                    log::debug!("step {} loss={:.4}", step, loss);
                }
            }

            let mean_loss = loss_sum / steps_per_epoch as f32;
            let metrics = self.evaluate(&model, &validation, num_labels)?;
            log::info!("epoch {} done: loss={:.4} {}", epoch, mean_loss, metrics.summary());
            epochs.push(EpochReport {
                epoch,
                mean_loss,
                validation: metrics,
            });
        }

        let export_dir = export_bundle(&config.export_dir, &varmap, &encoder, &base_config, &dataset.labels)?;
        log::info!("Training finished in {:.2?}", started.elapsed());

        Ok(TrainingReport {
            seed: config.seed,
            epochs,
            export_dir,
        })
    }

    /// Scores a prepared split in batches and computes the metrics.
    pub fn evaluate(
        &self,
        model: &BertMultiLabel,
        split: &PreparedSplit,
        num_labels: usize,
    ) -> Result<EvalMetrics, TrainingError> {
        let mut logits = Vec::with_capacity(split.len() * num_labels);
        let order: Vec<usize> = (0..split.len()).collect();
        for indices in order.chunks(self.config.batch_size) {
            let (batch, _) = split.batch(indices, &self.device)?;
            let batch_logits = model.forward_batch(&batch, &self.device)?.detach();
            logits.extend(batch_logits.flatten_all()?.to_vec1::<f32>()?);
        }

        let targets: Vec<f32> = split.targets.iter().flatten().copied().collect();
        let logits = Array2::from_shape_vec((split.len(), num_labels), logits)
            .map_err(|e| TrainingError::InvalidConfig(format!("unexpected logits shape: {}", e)))?;
        let labels = Array2::from_shape_vec((split.len(), num_labels), targets)
            .map_err(|e| TrainingError::InvalidConfig(format!("unexpected target shape: {}", e)))?;
        Ok(compute_metrics(logits.view(), labels.view())?)
    }
}

fn linear_decay(base: f64, step: usize, total: usize) -> f64 {
    if total == 0 {
        return base;
    }
    base * (1.0 - step.min(total) as f64 / total as f64)
}
