#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{bail, ensure, Result};
use blipserve_core::{
    Backend, BackendCapabilities, Device, IOName, ModelArtifact, NlvrModel, RgbImage, Shape,
    Tensor, VqaModel,
};
use blipserve_runtime::{InferenceRequest, InitArgs};
use image::Rgb;
use serde_json::json;
use tempfile::TempDir;

/// Records what the adapters asked of the backend.
#[derive(Default)]
pub struct Journal {
    pub loads: Vec<(ModelArtifact, Device)>,
    pub call_sizes: Vec<usize>,
}

#[derive(Clone)]
pub struct FakeBackend {
    pub journal: Arc<Mutex<Journal>>,
    pub supports_cuda: bool,
    pub max_batch: usize,
}

impl FakeBackend {
    pub fn new(max_batch: usize) -> Self {
        Self {
            journal: Arc::default(),
            supports_cuda: false,
            max_batch,
        }
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.journal.lock().unwrap().call_sizes.clone()
    }

    pub fn loads(&self) -> Vec<(ModelArtifact, Device)> {
        self.journal.lock().unwrap().loads.clone()
    }

    fn record_load(&self, artifact: &ModelArtifact, device: Device) -> Result<()> {
        if artifact.path().starts_with("/missing") {
            bail!("checkpoint {} not found", artifact.path().display());
        }
        self.journal.lock().unwrap().loads.push((artifact.clone(), device));
        Ok(())
    }
}

pub struct FakeVqa {
    journal: Arc<Mutex<Journal>>,
}

impl VqaModel for FakeVqa {
    /// Answers with the image size, so tests can tell which image reached the model.
    fn answer(&mut self, images: &[RgbImage], questions: &[String]) -> Result<Vec<String>> {
        ensure!(images.len() == questions.len(), "length mismatch");
        self.journal.lock().unwrap().call_sizes.push(images.len());
        images
            .iter()
            .zip(questions)
            .map(|(image, question)| {
                if question == "boom" {
                    bail!("CUDA out of memory");
                }
                Ok(format!("{question} -> {}x{}", image.width(), image.height()))
            })
            .collect()
    }
}

pub struct FakeNlvr {
    journal: Arc<Mutex<Journal>>,
}

impl NlvrModel for FakeNlvr {
    /// True when both images are identical or the statement mentions "two".
    fn verify(
        &mut self,
        left: &[RgbImage],
        right: &[RgbImage],
        statements: &[String],
    ) -> Result<Vec<bool>> {
        self.journal.lock().unwrap().call_sizes.push(statements.len());
        Ok(left
            .iter()
            .zip(right)
            .zip(statements)
            .map(|((l, r), s)| l == r || s.contains("two"))
            .collect())
    }
}

impl Backend for FakeBackend {
    type Vqa = FakeVqa;
    type Nlvr = FakeNlvr;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn load_vqa(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Vqa> {
        ensure!(matches!(artifact, ModelArtifact::BlipVqa(_)), "wrong artifact");
        self.record_load(artifact, device)?;
        Ok(FakeVqa {
            journal: self.journal.clone(),
        })
    }

    fn load_nlvr(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Nlvr> {
        ensure!(matches!(artifact, ModelArtifact::BlipNlvr(_)), "wrong artifact");
        self.record_load(artifact, device)?;
        Ok(FakeNlvr {
            journal: self.journal.clone(),
        })
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_cuda: self.supports_cuda,
            max_batch: self.max_batch,
        }
    }
}

pub fn model_config(name: &str, output: &str, data_type: &str, parameters: &[(&str, &str)]) -> String {
    let parameters: serde_json::Map<String, serde_json::Value> = parameters
        .iter()
        .map(|(k, v)| (k.to_string(), json!({ "string_value": v })))
        .collect();
    json!({
        "name": name,
        "backend": "python",
        "output": [{ "name": output, "data_type": data_type, "dims": [-1] }],
        "parameters": parameters,
    })
    .to_string()
}

pub fn init_args(config: String) -> InitArgs {
    let mut args = InitArgs::new(config);
    args.model_instance_kind = "KIND_GPU".into();
    args.model_instance_device_id = "0".into();
    args
}

pub fn strings(values: &[&str]) -> Result<Tensor> {
    Tensor::from_strings(Shape::vector(values.len()), values)
}

pub fn request(id: &str, inputs: Vec<(&str, Tensor)>) -> InferenceRequest {
    InferenceRequest::new(
        Some(id.to_string()),
        inputs
            .into_iter()
            .map(|(name, t)| (IOName::new(name), t))
            .collect(),
    )
}

/// PNG fixtures on disk, removed when the gallery is dropped.
pub struct Gallery {
    dir: TempDir,
}

impl Gallery {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Writes a solid grey `width`x`height` PNG and returns its path.
    pub fn image(&self, name: &str, width: u32, height: u32) -> Result<String> {
        let path = self.dir.path().join(name);
        RgbImage::from_pixel(width, height, Rgb([120, 120, 120])).save(&path)?;
        Ok(path.to_string_lossy().into_owned())
    }
}

pub fn paths(values: &[String]) -> Result<Tensor> {
    Tensor::from_strings(Shape::vector(values.len()), values)
}
