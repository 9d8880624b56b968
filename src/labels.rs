use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File name of the label vocabulary inside an artifact bundle.
pub const LABEL_NAMES_FILE: &str = "label_names.json";

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("Failed to read label vocabulary {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid label vocabulary {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Label vocabulary {0} is empty")]
    Empty(String),
}

/// Ordered label names. The position of a name is the index of its score
/// in every vector the model produces, so order must never change between
/// training and serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVocabulary {
    names: Vec<String>,
}

impl LabelVocabulary {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Reads a vocabulary from a JSON array of strings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: display.clone(),
            source,
        })?;
        let vocabulary: Self = serde_json::from_str(&raw).map_err(|source| LabelError::Parse {
            path: display.clone(),
            source,
        })?;
        if vocabulary.is_empty() {
            return Err(LabelError::Empty(display));
        }
        log::info!("Loaded {} labels from {:?}", vocabulary.len(), path);
        Ok(vocabulary)
    }

    /// Writes the vocabulary as a JSON array of strings.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LabelError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let json = serde_json::to_string(&self.names).map_err(|source| LabelError::Parse {
            path: display.clone(),
            source,
        })?;
        fs::write(path, json).map_err(|source| LabelError::Io { path: display, source })
    }
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LABEL_NAMES_FILE);
        let vocabulary = LabelVocabulary::new(vec![
            "joy".to_string(),
            "anger".to_string(),
            "neutral".to_string(),
        ]);

        vocabulary.save(&path).unwrap();
        let loaded = LabelVocabulary::load(&path).unwrap();

        assert_eq!(loaded, vocabulary);
        assert_eq!(loaded.get(1), Some("anger"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"["joy","anger","neutral"]"#);
    }

    #[test]
    fn test_empty_vocabulary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LABEL_NAMES_FILE);
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(LabelVocabulary::load(&path), Err(LabelError::Empty(_))));
    }

    #[test]
    fn test_non_array_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LABEL_NAMES_FILE);
        std::fs::write(&path, r#"{"joy": 0}"#).unwrap();
        assert!(matches!(LabelVocabulary::load(&path), Err(LabelError::Parse { .. })));
    }
}
