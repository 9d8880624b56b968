#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::str::FromStr;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde_json::json;
use tokenizers::Tokenizer;

pub const WORDS: [&str; 12] = [
    "i", "am", "so", "happy", "sad", "today", "this", "is", "great", "awful", "wow", "thanks",
];

/// Word-level tokenizer with BERT special tokens: `[PAD]`=0, `[UNK]`=1,
/// `[CLS]`=2, `[SEP]`=3, then [`WORDS`].
pub fn tokenizer_json() -> String {
    let mut vocab = serde_json::Map::new();
    for (id, token) in ["[PAD]", "[UNK]", "[CLS]", "[SEP]"].iter().chain(WORDS.iter()).enumerate() {
        vocab.insert(token.to_string(), json!(id));
    }
    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": {"type": "Lowercase"},
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {"type": "BertProcessing", "sep": ["[SEP]", 3], "cls": ["[CLS]", 2]},
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]"}
    })
    .to_string()
}

pub fn tokenizer() -> Tokenizer {
    Tokenizer::from_str(&tokenizer_json()).unwrap()
}

pub fn bert_config_json() -> serde_json::Value {
    json!({
        "architectures": ["BertModel"],
        "model_type": "bert",
        "vocab_size": WORDS.len() + 4,
        "hidden_size": 8,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "attention_probs_dropout_prob": 0.1,
        "max_position_embeddings": 160,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "use_cache": true,
        "classifier_dropout": null
    })
}

/// Writes a randomly initialized encoder in the layout of a hub checkpoint:
/// `config.json`, `tokenizer.json` and `model.safetensors` without a
/// classification head.
pub fn write_base_model(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let config = bert_config_json();
    fs::write(dir.join("config.json"), config.to_string()).unwrap();
    fs::write(dir.join("tokenizer.json"), tokenizer_json()).unwrap();

    let config: BertConfig = serde_json::from_value(config).unwrap();
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    BertModel::load(vb.pp("bert"), &config).unwrap();
    varmap.save(dir.join("model.safetensors")).unwrap();
}

/// A three-label dataset in the GoEmotions TSV layout.
pub fn write_dataset(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("emotions.txt"), "joy\nsadness\nneutral\n").unwrap();
    let rows = "i am so happy today\t0\tid1\n\
                this is awful\t1\tid2\n\
                this is great thanks\t0,0\tid3\n\
                i am sad today\t1\tid4\n\
                this is\t2\tid5\n\
                wow\t0,2\tid6\n";
    for split in ["train.tsv", "dev.tsv", "test.tsv"] {
        fs::write(dir.join(split), rows).unwrap();
    }
}
