use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::TrainingError;

/// Standard deviation used for weights the checkpoint does not provide,
/// matching BERT's `initializer_range`.
const INIT_STD: f32 = 0.02;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PretrainedSummary {
    pub loaded: usize,
    pub initialized: Vec<String>,
}

/// Overwrites every trainable variable with the checkpoint tensor of the
/// same name. Variables missing from the checkpoint (usually the
/// classification head) are initialized from `seed`.
pub fn load_pretrained(
    varmap: &VarMap,
    checkpoint: &Path,
    device: &Device,
    seed: u64,
) -> Result<PretrainedSummary, TrainingError> {
    let tensors = candle_core::safetensors::load(checkpoint, device)?;
    log::info!("Read {} tensors from {:?}", tensors.len(), checkpoint);
    apply_pretrained(varmap, &tensors, device, seed)
}

pub(crate) fn apply_pretrained(
    varmap: &VarMap,
    tensors: &HashMap<String, Tensor>,
    device: &Device,
    seed: u64,
) -> Result<PretrainedSummary, TrainingError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, INIT_STD)
        .map_err(|e| TrainingError::Pretrained(format!("invalid init distribution: {}", e)))?;

    let data = varmap
        .data()
        .lock()
        .map_err(|_| TrainingError::Pretrained("variable map lock poisoned".into()))?;

    // Sorted so the seeded initialization does not depend on hash order.
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut summary = PretrainedSummary::default();
    for name in names {
        let var = &data[name];
        match candidate_names(name).iter().find_map(|candidate| tensors.get(candidate)) {
            Some(tensor) => {
                if tensor.dims() != var.dims() {
                    return Err(TrainingError::Pretrained(format!(
                        "checkpoint tensor for {} has shape {:?}, expected {:?}",
                        name,
                        tensor.dims(),
                        var.dims()
                    )));
                }
                var.set(&tensor.to_dtype(DType::F32)?)?;
                summary.loaded += 1;
            }
            None => {
                let init = if name.ends_with("LayerNorm.weight") {
                    Tensor::ones(var.shape().clone(), DType::F32, device)?
                } else if name.ends_with(".bias") {
                    Tensor::zeros(var.shape().clone(), DType::F32, device)?
                } else {
                    let values: Vec<f32> = (0..var.elem_count()).map(|_| normal.sample(&mut rng)).collect();
                    Tensor::from_vec(values, var.shape().clone(), device)?
                };
                var.set(&init)?;
                summary.initialized.push(name.clone());
            }
        }
    }

    if summary.loaded == 0 {
        return Err(TrainingError::Pretrained(
            "checkpoint shares no tensors with the BERT classifier".into(),
        ));
    }
    log::info!(
        "Loaded {} pretrained tensors, initialized {} from seed {}: {:?}",
        summary.loaded,
        summary.initialized.len(),
        seed,
        summary.initialized
    );
    Ok(summary)
}

/// Names a variable may have in a checkpoint: as is, without the `bert.`
/// prefix, and with legacy `gamma`/`beta` LayerNorm parameters.
fn candidate_names(name: &str) -> Vec<String> {
    let mut candidates = vec![name.to_string()];
    if let Some(stripped) = name.strip_prefix("bert.") {
        candidates.push(stripped.to_string());
    }
    let legacy: Vec<String> = candidates
        .iter()
        .filter_map(|c| {
            c.strip_suffix("LayerNorm.weight")
                .map(|base| format!("{}LayerNorm.gamma", base))
                .or_else(|| c.strip_suffix("LayerNorm.bias").map(|base| format!("{}LayerNorm.beta", base)))
        })
        .collect();
    candidates.extend(legacy);
    candidates
}
