use anyhow::{ensure, Context, Result};
use blipserve_core::{NlvrModel, RgbImage};
use ndarray::ArrayD;
use ort::session::Session;

use crate::argmax;
use crate::preprocess::{pixel_batch, NLVR_IMAGE_SIZE};
use crate::session::{extract_f32, f32_input, i64_input};
use crate::text::{BlipTokenizer, TextBatch};

pub struct OrtNlvrModel {
    pub(crate) session: Session,
    pub(crate) tokenizer: BlipTokenizer,
}

impl NlvrModel for OrtNlvrModel {
    fn verify(
        &mut self,
        left: &[RgbImage],
        right: &[RgbImage],
        statements: &[String],
    ) -> Result<Vec<bool>> {
        ensure!(
            left.len() == right.len() && left.len() == statements.len(),
            "got {} left images, {} right images and {} statements",
            left.len(),
            right.len(),
            statements.len()
        );
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let (left_shape, left_pixels) = pixel_batch(left, NLVR_IMAGE_SIZE);
        let (right_shape, right_pixels) = pixel_batch(right, NLVR_IMAGE_SIZE);
        let text = encode_statements(&mut self.tokenizer, statements)?;
        let text_shape = text.shape();

        let inputs = vec![
            f32_input("pixel_values0", left_shape, left_pixels)?,
            f32_input("pixel_values1", right_shape, right_pixels)?,
            i64_input("input_ids", text_shape.clone(), text.input_ids)?,
            i64_input("attention_mask", text_shape, text.attention_mask)?,
        ];
        let outputs = self.session.run(inputs).context("NLVR graph failed")?;
        let logits = extract_f32(&outputs, "logits")?;
        verdicts_from_logits(&logits, statements.len())
    }
}

/// Statements go to the text encoder whole; only padding is applied.
pub fn encode_statements(tokenizer: &mut BlipTokenizer, statements: &[String]) -> Result<TextBatch> {
    tokenizer.encode_batch(statements, None)
}

/// `[batch, 2]` logits to verdicts: class 1 means the statement holds.
pub fn verdicts_from_logits(logits: &ArrayD<f32>, batch: usize) -> Result<Vec<bool>> {
    ensure!(
        logits.shape() == [batch, 2],
        "unexpected NLVR logits shape {:?}",
        logits.shape()
    );
    Ok(logits
        .outer_iter()
        .map(|scores| argmax(scores.iter().copied()) == 1)
        .collect())
}
