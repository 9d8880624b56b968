use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::labels::LabelVocabulary;

/// Label list shipped with the GoEmotions data, one name per line.
pub const LABELS_FILE: &str = "emotions.txt";
pub const TRAIN_FILE: &str = "train.tsv";
pub const VALIDATION_FILE: &str = "dev.tsv";
pub const TEST_FILE: &str = "test.tsv";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Malformed {
        path: String,
        line: usize,
        message: String,
    },
    #[error("Label index {index} is out of range for {num_labels} labels")]
    LabelOutOfRange { index: usize, num_labels: usize },
    #[error("Label list {0} is empty")]
    NoLabels(String),
}

/// One labeled text. `labels` holds indices into the label vocabulary and
/// may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub text: String,
    pub labels: Vec<usize>,
}

impl Example {
    pub fn new(text: impl Into<String>, labels: Vec<usize>) -> Self {
        Self { text: text.into(), labels }
    }

    /// Multi-hot target for this example.
    pub fn target(&self, num_labels: usize) -> Result<Vec<f32>, DatasetError> {
        multi_hot_encode(&self.labels, num_labels)
    }
}

/// Builds a vector of length `num_labels` with 1.0 at every listed index.
///
/// Repeated indices set the same cell. An index outside `0..num_labels`
/// is rejected rather than ignored.
pub fn multi_hot_encode(labels: &[usize], num_labels: usize) -> Result<Vec<f32>, DatasetError> {
    let mut multi_hot = vec![0.0f32; num_labels];
    for &index in labels {
        let cell = multi_hot
            .get_mut(index)
            .ok_or(DatasetError::LabelOutOfRange { index, num_labels })?;
        *cell = 1.0;
    }
    Ok(multi_hot)
}

/// The three splits of a dataset plus its label vocabulary.
#[derive(Debug, Clone)]
pub struct EmotionDataset {
    pub labels: LabelVocabulary,
    pub train: Vec<Example>,
    pub validation: Vec<Example>,
    pub test: Vec<Example>,
}

impl EmotionDataset {
    /// Loads a directory laid out like the GoEmotions release:
    /// `emotions.txt`, `train.tsv`, `dev.tsv` and `test.tsv`.
    ///
    /// `limit` caps the number of examples kept per split.
    pub fn from_dir<P: AsRef<Path>>(dir: P, limit: Option<usize>) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let labels = load_label_names(dir.join(LABELS_FILE))?;
        let num_labels = labels.len();

        let load = |name: &str| -> Result<Vec<Example>, DatasetError> {
            let mut examples = load_split(dir.join(name), num_labels)?;
            if let Some(limit) = limit {
                examples.truncate(limit);
            }
            log::info!("Loaded {} examples from {}", examples.len(), name);
            Ok(examples)
        };

        Ok(Self {
            train: load(TRAIN_FILE)?,
            validation: load(VALIDATION_FILE)?,
            test: load(TEST_FILE)?,
            labels,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}

/// Reads one label name per non-empty line.
pub fn load_label_names<P: AsRef<Path>>(path: P) -> Result<LabelVocabulary, DatasetError> {
    let path = path.as_ref();
    let raw = read(path)?;
    let names: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(DatasetError::NoLabels(path.display().to_string()));
    }
    Ok(LabelVocabulary::new(names))
}

/// Reads a `text<TAB>labels<TAB>id` split where `labels` is a comma
/// separated list of label indices.
pub fn load_split<P: AsRef<Path>>(path: P, num_labels: usize) -> Result<Vec<Example>, DatasetError> {
    let path = path.as_ref();
    let raw = read(path)?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_row(line, num_labels).map_err(|message| malformed(path, i + 1, message)))
        .collect()
}

fn parse_row(line: &str, num_labels: usize) -> Result<Example, String> {
    let mut columns = line.split('\t');
    let text = columns.next().ok_or("missing text column")?;
    let labels = columns.next().ok_or("missing labels column")?;

    let labels = labels
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let index: usize = s.parse().map_err(|_| format!("invalid label index '{}'", s))?;
            if index >= num_labels {
                return Err(format!("label index {} out of range for {} labels", index, num_labels));
            }
            Ok(index)
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Example::new(text, labels))
}

fn malformed(path: &Path, line: usize, message: String) -> DatasetError {
    DatasetError::Malformed {
        path: path.display().to_string(),
        line,
        message,
    }
}

fn read(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: PathBuf::from(path).display().to_string(),
        source,
    })
}
