//! BLIP task adapters for the serving host.
//!
//! Each adapter owns one pretrained network, loaded through a [`blipserve_core::Backend`],
//! and maps host tensors to network calls one request at a time.

mod common;
pub mod nlvr;
pub mod vqa;

pub use nlvr::*;
pub use vqa::*;

/// Parameter that overrides the hardcoded checkpoint location.
pub const CHECKPOINT_PARAMETER: &str = "checkpoint";
/// Parameter that toggles sending a whole request through the network at once.
pub const MODAL_LEVEL_BATCH_PARAMETER: &str = "modal_level_batch";
