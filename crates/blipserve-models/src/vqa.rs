use std::time::Instant;

use anyhow::{Context, Result};
use blipserve_core::{Backend, DType, IOName, InferError, ModelArtifact, Tensor, VqaModel};
use blipserve_runtime::{resolve_device, Adapter, InferenceRequest, InferenceResponse, InitArgs};
use tracing::{debug, error, info};

use crate::common::{
    encode_answers, ensure_same_count, image_elements, model_error, run_chunked, text_elements,
    Settings,
};

pub const VQA_IMAGE_INPUT: &str = "INPUT0";
pub const VQA_QUESTION_INPUT: &str = "INPUT1";
pub const VQA_ANSWER_OUTPUT: &str = "OUTPUT0";

pub const DEFAULT_VQA_CHECKPOINT: &str = "/workspace/model_base_vqa_capfilt_large";

struct LoadedVqa<M> {
    model: M,
    settings: Settings,
}

/// Answers one free-form question per image.
pub struct VqaAdapter<B: Backend> {
    backend: B,
    loaded: Option<LoadedVqa<B::Vqa>>,
}

impl<B: Backend> VqaAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn answer_request(
        &mut self,
        req: &InferenceRequest,
    ) -> Result<(Vec<(IOName, Tensor)>, u64), InferError> {
        let loaded = self.loaded.as_mut().ok_or(InferError::NotInitialized)?;

        let images = image_elements(req, VQA_IMAGE_INPUT)?;
        let (questions, shape) = text_elements(req, VQA_QUESTION_INPUT)?;
        ensure_same_count(&[
            (VQA_IMAGE_INPUT, images.len()),
            (VQA_QUESTION_INPUT, questions.len()),
        ])?;

        let t0 = Instant::now();
        let model = &mut loaded.model;
        let answers = run_chunked(images.len(), loaded.settings.chunk_size(), |range| {
            model.answer(&images[range.clone()], &questions[range])
        })
        .map_err(model_error)?;
        let backend_us = t0.elapsed().as_micros() as u64;

        let tensor = encode_answers(
            VQA_ANSWER_OUTPUT,
            loaded.settings.output_dtype,
            shape,
            &answers,
        )?;
        Ok((vec![(IOName::new(VQA_ANSWER_OUTPUT), tensor)], backend_us))
    }
}

impl<B: Backend> Adapter for VqaAdapter<B> {
    fn name(&self) -> &'static str {
        "blip_vqa"
    }

    fn initialize(&mut self, args: &InitArgs) -> Result<()> {
        let config = args.config()?;
        let caps = self.backend.capabilities();
        let settings = Settings::from_config(
            &config,
            VQA_ANSWER_OUTPUT,
            &[DType::Bytes],
            DEFAULT_VQA_CHECKPOINT,
            &caps,
        )?;
        let device = resolve_device(args, &caps)?;

        let artifact = ModelArtifact::BlipVqa(settings.checkpoint.clone());
        let model = self
            .backend
            .load_vqa(&artifact, device.clone())
            .with_context(|| {
                format!(
                    "failed to load VQA checkpoint {}",
                    settings.checkpoint.display()
                )
            })?;

        info!(
            model = %config.name,
            backend = self.backend.name(),
            checkpoint = %settings.checkpoint.display(),
            ?device,
            modal_level_batch = settings.modal_level_batch,
            "initialized"
        );
        self.loaded = Some(LoadedVqa { model, settings });
        Ok(())
    }

    fn execute(&mut self, requests: Vec<InferenceRequest>) -> Vec<InferenceResponse> {
        debug!(batch = requests.len(), "vqa execute");
        requests
            .into_iter()
            .map(|req| match self.answer_request(&req) {
                Ok((outputs, backend_us)) => InferenceResponse::ok(req.id, outputs, backend_us),
                Err(err) => {
                    error!(request_id = ?req.id, error = %err, "vqa request failed");
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
