use std::fs;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use serde_json::{Map, Value};

use super::TrainingError;
use crate::bundle::{BundleWriter, WeightsFormat};
use crate::classifier::ClassifierError;
use crate::encoding::TextEncoder;
use crate::labels::LabelVocabulary;

/// Writes weights, tokenizer, config and label vocabulary as one bundle.
///
/// Nothing is visible at `export_dir` until every file has been written.
pub fn export_bundle(
    export_dir: &Path,
    varmap: &VarMap,
    encoder: &TextEncoder,
    base_config: &Path,
    labels: &LabelVocabulary,
) -> Result<PathBuf, TrainingError> {
    let writer = BundleWriter::new(export_dir)?;
    let staging = writer.staging();

    varmap.save(staging.weights(WeightsFormat::Safetensors))?;
    encoder
        .tokenizer()
        .save(staging.tokenizer(), false)
        .map_err(|e| ClassifierError::TokenizerError(format!("Failed to save tokenizer: {}", e)))?;

    let config = classification_config(&fs::read_to_string(base_config)?, labels)?;
    fs::write(staging.config(), serde_json::to_string_pretty(&config)?)?;
    labels.save(staging.label_names())?;

    Ok(writer.commit()?)
}

/// Adds the label maps and multi-label problem type to an encoder config.
pub(crate) fn classification_config(
    base_config: &str,
    labels: &LabelVocabulary,
) -> Result<Value, TrainingError> {
    let mut config: Map<String, Value> = serde_json::from_str(base_config)?;

    let id2label: Map<String, Value> = labels
        .iter()
        .enumerate()
        .map(|(i, name)| (i.to_string(), Value::from(name)))
        .collect();
    let label2id: Map<String, Value> = labels
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), Value::from(i)))
        .collect();

    config.insert("architectures".into(), Value::from(vec!["BertForSequenceClassification"]));
    config.insert("problem_type".into(), Value::from("multi_label_classification"));
    config.insert("id2label".into(), Value::Object(id2label));
    config.insert("label2id".into(), Value::Object(label2id));
    Ok(Value::Object(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_config_keeps_encoder_fields() {
        let labels = LabelVocabulary::new(vec!["joy".into(), "anger".into()]);
        let config = classification_config(r#"{"hidden_size": 768, "model_type": "bert"}"#, &labels).unwrap();

        assert_eq!(config["hidden_size"], 768);
        assert_eq!(config["problem_type"], "multi_label_classification");
        assert_eq!(config["id2label"]["1"], "anger");
        assert_eq!(config["label2id"]["joy"], 0);
        assert_eq!(config["architectures"][0], "BertForSequenceClassification");
    }

    #[test]
    fn test_classification_config_rejects_non_object() {
        let labels = LabelVocabulary::new(vec!["joy".into()]);
        assert!(classification_config("[1, 2]", &labels).is_err());
    }
}
