use std::path::Path;

use tokenizers::{Encoding, PaddingDirection, Tokenizer, TruncationParams};

use crate::classifier::ClassifierError;

/// Number of token positions every example is padded or truncated to.
pub const MAX_SEQUENCE_LENGTH: usize = 128;

const DEFAULT_PAD_TOKEN: &str = "[PAD]";

/// Token ids, attention mask and segment ids for one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedExample {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

impl TokenizedExample {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    fn from_encoding(encoding: &Encoding) -> Self {
        Self {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            token_type_ids: encoding.get_type_ids().to_vec(),
        }
    }
}

/// Row-major token matrices for a batch of equally long examples.
#[derive(Debug, Clone, Default)]
pub struct TokenizedBatch {
    pub rows: usize,
    pub seq_len: usize,
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

impl TokenizedBatch {
    /// Stacks examples into one batch. All examples must share a length.
    pub fn stack<'a, I>(examples: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = &'a TokenizedExample>,
    {
        let mut batch = Self::default();
        for example in examples {
            if batch.rows == 0 {
                batch.seq_len = example.len();
            } else if example.len() != batch.seq_len {
                return Err(ClassifierError::ValidationError(format!(
                    "Cannot batch sequences of length {} and {}",
                    batch.seq_len,
                    example.len()
                )));
            }
            batch.input_ids.extend_from_slice(&example.input_ids);
            batch.attention_mask.extend_from_slice(&example.attention_mask);
            batch.token_type_ids.extend_from_slice(&example.token_type_ids);
            batch.rows += 1;
        }
        Ok(batch)
    }
}

/// Wraps a tokenizer so every text is truncated to a fixed number of
/// positions, optionally padding up to it.
#[derive(Debug, Clone)]
pub struct TextEncoder {
    tokenizer: Tokenizer,
    max_length: usize,
    pad_id: u32,
    pad_token: String,
}

impl TextEncoder {
    pub fn from_file<P: AsRef<Path>>(path: P, max_length: usize) -> Result<Self, ClassifierError> {
        let tokenizer = Tokenizer::from_file(path.as_ref()).map_err(|e| {
            log::error!("Failed to load tokenizer from {:?}: {}", path.as_ref(), e);
            ClassifierError::TokenizerError(format!(
                "Failed to load tokenizer {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::new(tokenizer, max_length)
    }

    pub fn new(mut tokenizer: Tokenizer, max_length: usize) -> Result<Self, ClassifierError> {
        if max_length == 0 {
            return Err(ClassifierError::ValidationError("max_length must be positive".into()));
        }

        let (pad_id, pad_token) = match tokenizer.get_padding() {
            Some(params) => (params.pad_id, params.pad_token.clone()),
            None => (
                tokenizer.token_to_id(DEFAULT_PAD_TOKEN).unwrap_or(0),
                DEFAULT_PAD_TOKEN.to_string(),
            ),
        };

        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;

        Ok(Self {
            tokenizer,
            max_length,
            pad_id,
            pad_token,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Tokenizes with special tokens, truncating at `max_length`.
    pub fn encode(&self, text: &str) -> Result<TokenizedExample, ClassifierError> {
        let encoding = self.encode_raw(text)?;
        Ok(TokenizedExample::from_encoding(&encoding))
    }

    /// Like [`encode`](Self::encode) but right-pads to exactly
    /// `max_length` positions with a zero attention mask on the padding.
    pub fn encode_padded(&self, text: &str) -> Result<TokenizedExample, ClassifierError> {
        let mut encoding = self.encode_raw(text)?;
        encoding.pad(
            self.max_length,
            self.pad_id,
            0,
            &self.pad_token,
            PaddingDirection::Right,
        );
        Ok(TokenizedExample::from_encoding(&encoding))
    }

    /// Counts tokens after truncation, special tokens included.
    pub fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        self.encode_raw(text).map(|encoding| encoding.get_ids().len())
    }

    fn encode_raw(&self, text: &str) -> Result<Encoding, ClassifierError> {
        self.tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(ids: &[u32]) -> TokenizedExample {
        TokenizedExample {
            input_ids: ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            token_type_ids: vec![0; ids.len()],
        }
    }

    #[test]
    fn test_stack_flattens_rows() {
        let a = example(&[101, 7, 102]);
        let b = example(&[101, 8, 102]);
        let batch = TokenizedBatch::stack([&a, &b]).unwrap();
        assert_eq!(batch.rows, 2);
        assert_eq!(batch.seq_len, 3);
        assert_eq!(batch.input_ids, vec![101, 7, 102, 101, 8, 102]);
        assert_eq!(batch.attention_mask.len(), 6);
    }

    #[test]
    fn test_stack_rejects_ragged_rows() {
        let a = example(&[101, 102]);
        let b = example(&[101, 5, 102]);
        assert!(matches!(
            TokenizedBatch::stack([&a, &b]),
            Err(ClassifierError::ValidationError(_))
        ));
    }
}
