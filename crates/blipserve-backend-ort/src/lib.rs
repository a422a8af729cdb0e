pub mod nlvr;
pub mod preprocess;
mod session;
pub mod text;
pub mod vqa;

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Result};
use blipserve_core::{Backend, BackendCapabilities, Device, ModelArtifact};
use tracing::info;

pub use nlvr::OrtNlvrModel;
pub use text::BlipTokenizer;
pub use vqa::{GreedyDecoder, OrtVqaModel};

use session::load_session;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const VQA_ENCODER_FILE: &str = "vqa_encoder.onnx";
pub const VQA_DECODER_FILE: &str = "vqa_decoder.onnx";
pub const NLVR_FILE: &str = "nlvr.onnx";

pub struct OrtBackend {
    intra_threads: usize,
    max_batch: usize,
}

impl OrtBackend {
    pub fn new() -> Self {
        Self {
            intra_threads: 4,
            max_batch: 16,
        }
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for OrtBackend {
    type Vqa = OrtVqaModel;
    type Nlvr = OrtNlvrModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load_vqa(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Vqa> {
        let ModelArtifact::BlipVqa(dir) = artifact else {
            bail!("VQA loader expects a BLIP VQA checkpoint, got {artifact:?}");
        };
        let [tokenizer, encoder, decoder] =
            checkpoint_files(dir, [TOKENIZER_FILE, VQA_ENCODER_FILE, VQA_DECODER_FILE])?;

        let model = OrtVqaModel {
            tokenizer: BlipTokenizer::from_file(tokenizer)?,
            encoder: load_session(&encoder, &device, self.intra_threads)?,
            decoder: load_session(&decoder, &device, self.intra_threads)?,
        };
        info!(checkpoint = %dir.display(), ?device, "loaded BLIP VQA");
        Ok(model)
    }

    fn load_nlvr(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Nlvr> {
        let ModelArtifact::BlipNlvr(dir) = artifact else {
            bail!("NLVR loader expects a BLIP NLVR checkpoint, got {artifact:?}");
        };
        let [tokenizer, graph] = checkpoint_files(dir, [TOKENIZER_FILE, NLVR_FILE])?;

        let model = OrtNlvrModel {
            tokenizer: BlipTokenizer::from_file(tokenizer)?,
            session: load_session(&graph, &device, self.intra_threads)?,
        };
        info!(checkpoint = %dir.display(), ?device, "loaded BLIP NLVR");
        Ok(model)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_cuda: cfg!(feature = "cuda"),
            max_batch: self.max_batch,
        }
    }
}

fn checkpoint_files<const N: usize>(dir: &Path, names: [&str; N]) -> Result<[PathBuf; N]> {
    ensure!(
        dir.is_dir(),
        "checkpoint directory {} does not exist",
        dir.display()
    );
    let paths = names.map(|name| dir.join(name));
    for path in &paths {
        ensure!(path.is_file(), "checkpoint file {} is missing", path.display());
    }
    Ok(paths)
}

/// Index of the largest score; NaNs never win.
pub fn argmax(scores: impl Iterator<Item = f32>) -> usize {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (idx, score) in scores.enumerate() {
        if score > best.1 {
            best = (idx, score);
        }
    }
    best.0
}
