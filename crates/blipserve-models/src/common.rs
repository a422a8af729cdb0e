use std::ops::Range;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use blipserve_core::{
    BackendCapabilities, DType, ImageSource, InferError, ModelConfig, RgbImage, Shape, Tensor,
};
use blipserve_runtime::InferenceRequest;
use bytes::Bytes;

use crate::{CHECKPOINT_PARAMETER, MODAL_LEVEL_BATCH_PARAMETER};

/// Load-time settings shared by both adapters.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub output_dtype: DType,
    pub checkpoint: PathBuf,
    pub modal_level_batch: bool,
    pub max_batch: usize,
}

impl Settings {
    pub fn from_config(
        config: &ModelConfig,
        output: &str,
        supported: &[DType],
        default_checkpoint: &str,
        caps: &BackendCapabilities,
    ) -> Result<Self> {
        let output_dtype = config.output_by_name(output)?.data_type;
        if !supported.contains(&output_dtype) {
            bail!(
                "output {output} is declared as {}, which this model cannot produce",
                output_dtype.config_name()
            );
        }

        let checkpoint = config
            .parameter(CHECKPOINT_PARAMETER)
            .unwrap_or(default_checkpoint)
            .into();
        let modal_level_batch = config
            .bool_parameter(MODAL_LEVEL_BATCH_PARAMETER, true)
            .context("invalid model parameters")?;

        Ok(Self {
            output_dtype,
            checkpoint,
            modal_level_batch,
            max_batch: caps.max_batch.max(1),
        })
    }

    /// Elements handed to one network call.
    pub fn chunk_size(&self) -> usize {
        if self.modal_level_batch {
            self.max_batch
        } else {
            1
        }
    }
}

fn byte_elements(req: &InferenceRequest, name: &str) -> Result<(Vec<Bytes>, Shape), InferError> {
    let tensor = req.input(name)?;
    if tensor.dtype != DType::Bytes {
        return Err(InferError::WrongType {
            name: name.to_string(),
            expected: DType::Bytes.wire_name(),
            actual: tensor.dtype.wire_name(),
        });
    }
    let elements = tensor.strings().map_err(|e| InferError::MalformedInput {
        name: name.to_string(),
        reason: format!("{e:#}"),
    })?;
    Ok((elements, tensor.shape.clone()))
}

pub(crate) fn text_elements(
    req: &InferenceRequest,
    name: &str,
) -> Result<(Vec<String>, Shape), InferError> {
    let (elements, shape) = byte_elements(req, name)?;
    let texts = elements
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            String::from_utf8(raw.to_vec()).map_err(|_| InferError::InvalidText {
                name: name.to_string(),
                index,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((texts, shape))
}

/// Reads and decodes every image element up front so a bad image is reported against
/// its input and index rather than as a model failure.
pub(crate) fn image_elements(
    req: &InferenceRequest,
    name: &str,
) -> Result<Vec<RgbImage>, InferError> {
    let (elements, _) = byte_elements(req, name)?;
    elements
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            ImageSource::from_element(raw)
                .and_then(|source| source.decode())
                .map_err(|e| InferError::InvalidImage {
                    name: name.to_string(),
                    index,
                    reason: format!("{e:#}"),
                })
        })
        .collect()
}

pub(crate) fn ensure_same_count(counts: &[(&str, usize)]) -> Result<usize, InferError> {
    let Some((_, first)) = counts.first() else {
        return Ok(0);
    };
    if counts.iter().all(|(_, n)| n == first) {
        return Ok(*first);
    }
    let detail = counts
        .iter()
        .map(|(name, n)| format!("{name}={n}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(InferError::CountMismatch(detail))
}

/// Calls `f` over consecutive ranges of at most `chunk` elements and concatenates results.
pub(crate) fn run_chunked<T>(
    len: usize,
    chunk: usize,
    mut f: impl FnMut(Range<usize>) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let chunk = chunk.max(1);
    let mut out = Vec::with_capacity(len);
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        let part = f(start..end)?;
        ensure!(
            part.len() == end - start,
            "model returned {} results for {} inputs",
            part.len(),
            end - start
        );
        out.extend(part);
        start = end;
    }
    Ok(out)
}

pub(crate) fn encode_answers(
    name: &str,
    dtype: DType,
    shape: Shape,
    answers: &[String],
) -> Result<Tensor, InferError> {
    let encoded = match dtype {
        DType::Bytes => Tensor::from_strings(shape, answers),
        other => Err(anyhow::anyhow!(
            "answers cannot be coded as {}",
            other.config_name()
        )),
    };
    encoded.map_err(|e| output_error(name, e))
}

pub(crate) fn encode_verdicts(
    name: &str,
    dtype: DType,
    shape: Shape,
    verdicts: &[bool],
) -> Result<Tensor, InferError> {
    let encoded = match dtype {
        DType::Bytes => Tensor::from_strings(
            shape,
            verdicts.iter().map(|v| if *v { "True" } else { "False" }),
        ),
        DType::Bool => Tensor::from_bools(shape, verdicts),
        DType::U8 => {
            let values: Vec<u8> = verdicts.iter().map(|v| u8::from(*v)).collect();
            Tensor::from_u8s(shape, &values)
        }
        DType::I32 => {
            let values: Vec<i32> = verdicts.iter().map(|v| i32::from(*v)).collect();
            Tensor::from_i32s(shape, &values)
        }
        DType::I64 => {
            let values: Vec<i64> = verdicts.iter().map(|v| i64::from(*v)).collect();
            Tensor::from_i64s(shape, &values)
        }
        DType::F32 => {
            let values: Vec<f32> = verdicts.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect();
            Tensor::from_f32s(shape, &values)
        }
        DType::F16 => Err(anyhow::anyhow!("verdicts cannot be coded as TYPE_FP16")),
    };
    encoded.map_err(|e| output_error(name, e))
}

fn output_error(name: &str, err: anyhow::Error) -> InferError {
    InferError::Output {
        name: name.to_string(),
        reason: format!("{err:#}"),
    }
}

pub(crate) fn model_error(err: anyhow::Error) -> InferError {
    InferError::Model(format!("{err:#}"))
}
