use anyhow::{ensure, Context, Result};
use blipserve_core::{RgbImage, VqaModel};
use ndarray::{ArrayD, Axis};
use ort::session::Session;
use tracing::debug;

use crate::argmax;
use crate::preprocess::{pixel_batch, VQA_IMAGE_SIZE};
use crate::session::{extract_f32, f32_input, i64_input};
use crate::text::{BlipTokenizer, TextBatch};

/// Longest answer the decoder may produce, excluding `[DEC]`.
pub const MAX_ANSWER_TOKENS: usize = 10;

/// Questions are truncated to this many tokens, special tokens included.
pub const MAX_QUESTION_LEN: usize = 35;

pub struct OrtVqaModel {
    pub(crate) encoder: Session,
    pub(crate) decoder: Session,
    pub(crate) tokenizer: BlipTokenizer,
}

impl VqaModel for OrtVqaModel {
    fn answer(&mut self, images: &[RgbImage], questions: &[String]) -> Result<Vec<String>> {
        ensure!(
            images.len() == questions.len(),
            "got {} images for {} questions",
            images.len(),
            questions.len()
        );
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let (pixel_shape, pixels) = pixel_batch(images, VQA_IMAGE_SIZE);
        let text = encode_questions(&mut self.tokenizer, questions)?;

        let encoder_inputs = vec![
            f32_input("pixel_values", pixel_shape, pixels)?,
            i64_input("input_ids", text.shape(), text.input_ids.clone())?,
            i64_input("attention_mask", text.shape(), text.attention_mask.clone())?,
        ];
        let states = {
            let outputs = self
                .encoder
                .run(encoder_inputs)
                .context("VQA encoder failed")?;
            extract_f32(&outputs, "question_states")?
        };
        let states_shape = states.shape().to_vec();
        let states: Vec<f32> = states.iter().copied().collect();

        let mut decoder = GreedyDecoder::new(
            images.len(),
            self.tokenizer.bos_id,
            self.tokenizer.sep_id,
            self.tokenizer.pad_id,
            MAX_ANSWER_TOKENS,
        );
        while !decoder.is_done() {
            let (ids_shape, ids) = decoder.input_ids();
            let step_inputs = vec![
                i64_input("input_ids", ids_shape, ids)?,
                f32_input("encoder_hidden_states", states_shape.clone(), states.clone())?,
                i64_input("encoder_attention_mask", text.shape(), text.attention_mask.clone())?,
            ];
            let outputs = self
                .decoder
                .run(step_inputs)
                .context("VQA decoder failed")?;
            let logits = extract_f32(&outputs, "logits")?;
            decoder.step(&next_tokens(&logits, images.len())?)?;
        }
        debug!(batch = images.len(), steps = decoder.steps(), "decoded answers");

        decoder
            .answers()
            .iter()
            .map(|ids| self.tokenizer.decode(ids))
            .collect()
    }
}

pub fn encode_questions(tokenizer: &mut BlipTokenizer, questions: &[String]) -> Result<TextBatch> {
    tokenizer.encode_batch(questions, Some(MAX_QUESTION_LEN))
}

/// Greedy pick per row, read from the last position of `[batch, T, vocab]` decoder logits.
pub fn next_tokens(logits: &ArrayD<f32>, batch: usize) -> Result<Vec<u32>> {
    let shape = logits.shape();
    ensure!(
        shape.len() == 3 && shape[0] == batch && shape[1] > 0 && shape[2] > 0,
        "unexpected decoder logits shape {shape:?}"
    );

    let last = logits.index_axis(Axis(1), shape[1] - 1);
    Ok(last
        .outer_iter()
        .map(|scores| argmax(scores.iter().copied()) as u32)
        .collect())
}

/// Batched greedy decoding state: one growing token row per element.
#[derive(Clone, Debug)]
pub struct GreedyDecoder {
    rows: Vec<Vec<u32>>,
    finished: Vec<bool>,
    sep_id: u32,
    pad_id: u32,
    max_new_tokens: usize,
    steps: usize,
}

impl GreedyDecoder {
    pub fn new(batch: usize, bos_id: u32, sep_id: u32, pad_id: u32, max_new_tokens: usize) -> Self {
        Self {
            rows: vec![vec![bos_id]; batch],
            finished: vec![false; batch],
            sep_id,
            pad_id,
            max_new_tokens,
            steps: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.steps >= self.max_new_tokens || self.finished.iter().all(|f| *f)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The current `[batch, len]` decoder input.
    pub fn input_ids(&self) -> (Vec<usize>, Vec<i64>) {
        let len = self.rows.first().map_or(0, Vec::len);
        let ids = self
            .rows
            .iter()
            .flat_map(|row| row.iter().map(|id| *id as i64))
            .collect();
        (vec![self.rows.len(), len], ids)
    }

    pub fn step(&mut self, next: &[u32]) -> Result<()> {
        ensure!(
            next.len() == self.rows.len(),
            "got {} next tokens for {} rows",
            next.len(),
            self.rows.len()
        );
        for ((row, done), token) in self.rows.iter_mut().zip(&mut self.finished).zip(next) {
            if *done {
                row.push(self.pad_id);
                continue;
            }
            row.push(*token);
            if *token == self.sep_id {
                *done = true;
            }
        }
        self.steps += 1;
        Ok(())
    }

    /// Generated tokens per row, without the leading `[DEC]` and cut at `[SEP]`.
    pub fn answers(&self) -> Vec<Vec<u32>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .skip(1)
                    .take_while(|id| **id != self.sep_id)
                    .copied()
                    .collect()
            })
            .collect()
    }
}
