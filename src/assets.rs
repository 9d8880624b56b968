//! Remote files the training pipeline needs: the GoEmotions release and a
//! pretrained encoder from the Hugging Face hub.

use crate::bundle::{CONFIG_FILE, SAFETENSORS_FILE, TOKENIZER_FILE};
use crate::dataset::{LABELS_FILE, TEST_FILE, TRAIN_FILE, VALIDATION_FILE};

const GOEMOTIONS_BASE_URL: &str =
    "https://raw.githubusercontent.com/google-research/google-research/master/goemotions/data";
const HF_BASE_URL: &str = "https://huggingface.co";

pub const DEFAULT_BASE_MODEL: &str = "google-bert/bert-base-uncased";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub url: String,
    /// Known SHA-256 of the file. When absent, the hash recorded at
    /// download time is used to verify the cached copy.
    pub sha256: Option<String>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

/// A named group of files cached together in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub name: String,
    pub files: Vec<RemoteFile>,
}

impl AssetInfo {
    /// GoEmotions "simplified": 27 emotions plus neutral, split into
    /// train/dev/test TSV files.
    pub fn goemotions() -> Self {
        let files = [LABELS_FILE, TRAIN_FILE, VALIDATION_FILE, TEST_FILE]
            .into_iter()
            .map(|name| RemoteFile::new(name, format!("{}/{}", GOEMOTIONS_BASE_URL, name)))
            .collect();
        Self {
            name: "goemotions".to_string(),
            files,
        }
    }

    /// Config, tokenizer and safetensors weights of a hub repository such as
    /// `google-bert/bert-base-uncased`.
    pub fn hub_model(repo: &str) -> Self {
        let files = [CONFIG_FILE, TOKENIZER_FILE, SAFETENSORS_FILE]
            .into_iter()
            .map(|name| RemoteFile::new(name, format!("{}/{}/resolve/main/{}", HF_BASE_URL, repo, name)))
            .collect();
        Self {
            name: repo.replace('/', "--"),
            files,
        }
    }
}
