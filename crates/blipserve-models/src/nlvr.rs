use std::time::Instant;

use anyhow::{Context, Result};
use blipserve_core::{Backend, DType, IOName, InferError, ModelArtifact, NlvrModel, Tensor};
use blipserve_runtime::{resolve_device, Adapter, InferenceRequest, InferenceResponse, InitArgs};
use tracing::{debug, error, info};

use crate::common::{
    encode_verdicts, ensure_same_count, image_elements, model_error, run_chunked, text_elements,
    Settings,
};

pub const NLVR_LEFT_INPUT: &str = "IMAGE0";
pub const NLVR_RIGHT_INPUT: &str = "IMAGE1";
pub const NLVR_TEXT_INPUT: &str = "TEXT";
pub const NLVR_ANSWER_OUTPUT: &str = "ANSWER";

pub const DEFAULT_NLVR_CHECKPOINT: &str = "/pretrained/model_base_nlvr";

const VERDICT_TYPES: &[DType] = &[
    DType::Bytes,
    DType::Bool,
    DType::U8,
    DType::I32,
    DType::I64,
    DType::F32,
];

struct LoadedNlvr<M> {
    model: M,
    settings: Settings,
}

/// Judges whether a statement holds for a pair of images.
pub struct NlvrAdapter<B: Backend> {
    backend: B,
    loaded: Option<LoadedNlvr<B::Nlvr>>,
}

impl<B: Backend> NlvrAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn verify_request(
        &mut self,
        req: &InferenceRequest,
    ) -> Result<(Vec<(IOName, Tensor)>, u64), InferError> {
        let loaded = self.loaded.as_mut().ok_or(InferError::NotInitialized)?;

        let left = image_elements(req, NLVR_LEFT_INPUT)?;
        let right = image_elements(req, NLVR_RIGHT_INPUT)?;
        let (statements, shape) = text_elements(req, NLVR_TEXT_INPUT)?;
        ensure_same_count(&[
            (NLVR_LEFT_INPUT, left.len()),
            (NLVR_RIGHT_INPUT, right.len()),
            (NLVR_TEXT_INPUT, statements.len()),
        ])?;

        let t0 = Instant::now();
        let model = &mut loaded.model;
        let verdicts = run_chunked(statements.len(), loaded.settings.chunk_size(), |range| {
            model.verify(
                &left[range.clone()],
                &right[range.clone()],
                &statements[range],
            )
        })
        .map_err(model_error)?;
        let backend_us = t0.elapsed().as_micros() as u64;

        let tensor = encode_verdicts(
            NLVR_ANSWER_OUTPUT,
            loaded.settings.output_dtype,
            shape,
            &verdicts,
        )?;
        Ok((vec![(IOName::new(NLVR_ANSWER_OUTPUT), tensor)], backend_us))
    }
}

impl<B: Backend> Adapter for NlvrAdapter<B> {
    fn name(&self) -> &'static str {
        "blip_nlvr"
    }

    fn initialize(&mut self, args: &InitArgs) -> Result<()> {
        let config = args.config()?;
        let caps = self.backend.capabilities();
        let settings = Settings::from_config(
            &config,
            NLVR_ANSWER_OUTPUT,
            VERDICT_TYPES,
            DEFAULT_NLVR_CHECKPOINT,
            &caps,
        )?;
        let device = resolve_device(args, &caps)?;

        let artifact = ModelArtifact::BlipNlvr(settings.checkpoint.clone());
        let model = self
            .backend
            .load_nlvr(&artifact, device.clone())
            .with_context(|| {
                format!(
                    "failed to load NLVR checkpoint {}",
                    settings.checkpoint.display()
                )
            })?;

        info!(
            model = %config.name,
            backend = self.backend.name(),
            checkpoint = %settings.checkpoint.display(),
            ?device,
            answer_type = settings.output_dtype.config_name(),
            "initialized"
        );
        self.loaded = Some(LoadedNlvr { model, settings });
        Ok(())
    }

    fn execute(&mut self, requests: Vec<InferenceRequest>) -> Vec<InferenceResponse> {
        debug!(batch = requests.len(), "nlvr execute");
        requests
            .into_iter()
            .map(|req| match self.verify_request(&req) {
                Ok((outputs, backend_us)) => InferenceResponse::ok(req.id, outputs, backend_us),
                Err(err) => {
                    error!(request_id = ?req.id, error = %err, "nlvr request failed");
                    InferenceResponse::err(req.id, err)
                }
            })
            .collect()
    }

    fn finalize(&mut self) {
        if self.loaded.take().is_some() {
            info!(adapter = self.name(), "Cleaning up...");
        }
    }
}
