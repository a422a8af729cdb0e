use anyhow::Result;

use crate::{Device, ModelArtifact, RgbImage};

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    /// Whether `Device::Cuda` can actually be honoured.
    pub supports_cuda: bool,
    /// Largest number of elements handed to one network call.
    pub max_batch: usize,
}

pub trait Backend: Send + Sync + 'static {
    type Vqa: VqaModel;
    type Nlvr: NlvrModel;

    fn name(&self) -> &'static str;
    fn load_vqa(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Vqa>;
    fn load_nlvr(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Nlvr>;
    fn capabilities(&self) -> BackendCapabilities;
}

/// Visual question answering: one answer per (image, question) pair.
pub trait VqaModel: Send + 'static {
    fn answer(&mut self, images: &[RgbImage], questions: &[String]) -> Result<Vec<String>>;
}

/// Natural language visual reasoning: is the statement true of the image pair?
pub trait NlvrModel: Send + 'static {
    fn verify(
        &mut self,
        left: &[RgbImage],
        right: &[RgbImage],
        statements: &[String],
    ) -> Result<Vec<bool>>;
}
