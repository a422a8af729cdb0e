use std::path::{Path, PathBuf};

/// A pretrained checkpoint on disk, tagged with the task it was trained for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelArtifact {
    BlipVqa(PathBuf),
    BlipNlvr(PathBuf),
}

impl ModelArtifact {
    pub fn path(&self) -> &Path {
        match self {
            ModelArtifact::BlipVqa(p) | ModelArtifact::BlipNlvr(p) => p,
        }
    }
}
