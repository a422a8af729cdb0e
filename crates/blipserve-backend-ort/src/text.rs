use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tokenizers::{Tokenizer, TruncationParams};

const BOS_TOKEN: &str = "[DEC]";
const ENC_TOKEN: &str = "[ENC]";
const SEP_TOKEN: &str = "[SEP]";
const PAD_TOKEN: &str = "[PAD]";

// bert-base-uncased ids, with [DEC]/[ENC] appended to the vocabulary
const DEFAULT_BOS_ID: u32 = 30522;
const DEFAULT_ENC_ID: u32 = 30523;
const DEFAULT_SEP_ID: u32 = 102;
const DEFAULT_PAD_ID: u32 = 0;

/// Token ids and mask for a padded batch, both `[batch, seq_len]` row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub batch: usize,
    pub seq_len: usize,
}

impl TextBatch {
    pub fn shape(&self) -> Vec<usize> {
        vec![self.batch, self.seq_len]
    }
}

pub struct BlipTokenizer {
    inner: Tokenizer,
    pub bos_id: u32,
    pub enc_id: u32,
    pub sep_id: u32,
    pub pad_id: u32,
}

impl BlipTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut inner = Tokenizer::from_file(path)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("failed to load tokenizer {}", path.display()))?;
        inner.with_padding(None);

        let id = |token: &str, fallback: u32| inner.token_to_id(token).unwrap_or(fallback);
        let bos_id = id(BOS_TOKEN, DEFAULT_BOS_ID);
        let enc_id = id(ENC_TOKEN, DEFAULT_ENC_ID);
        let sep_id = id(SEP_TOKEN, DEFAULT_SEP_ID);
        let pad_id = id(PAD_TOKEN, DEFAULT_PAD_ID);

        Ok(Self {
            inner,
            bos_id,
            enc_id,
            sep_id,
            pad_id,
        })
    }

    /// Encodes with special tokens, pads to the longest row and swaps the leading `[CLS]`
    /// for `[ENC]` so the text encoder attends to the image.
    ///
    /// `max_len` counts the special tokens; `None` keeps every token.
    pub fn encode_batch(&mut self, texts: &[String], max_len: Option<usize>) -> Result<TextBatch> {
        let truncation = max_len.map(|max_length| TruncationParams {
            max_length,
            ..Default::default()
        });
        self.inner
            .with_truncation(truncation)
            .map_err(|err| anyhow!(err))
            .context("invalid truncation length")?;

        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|err| anyhow!(err))
            .context("failed to tokenize text batch")?;

        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0).max(1);
        let mut input_ids = Vec::with_capacity(encodings.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(encodings.len() * seq_len);

        for encoding in &encodings {
            let row_start = input_ids.len();
            input_ids.extend(encoding.get_ids().iter().map(|id| *id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|m| *m as i64));

            let pad = seq_len - encoding.len();
            input_ids.extend(std::iter::repeat(self.pad_id as i64).take(pad));
            attention_mask.extend(std::iter::repeat(0).take(pad));

            input_ids[row_start] = self.enc_id as i64;
            attention_mask[row_start] = 1;
        }

        Ok(TextBatch {
            input_ids,
            attention_mask,
            batch: encodings.len(),
            seq_len,
        })
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|err| anyhow!(err))
            .context("failed to decode answer tokens")
    }
}
