use std::collections::HashMap;

use anyhow::{Context, Result};
use blipserve_core::{BackendCapabilities, Device, ModelConfig};
use tracing::warn;

use crate::{InferenceRequest, InferenceResponse};

/// The plugin contract a serving host drives.
///
/// `initialize` runs once before any `execute`; `finalize` runs once at unload. `execute`
/// must return one response per request, in request order.
pub trait Adapter: Send {
    fn name(&self) -> &'static str;
    fn initialize(&mut self, args: &InitArgs) -> Result<()>;
    fn execute(&mut self, requests: Vec<InferenceRequest>) -> Vec<InferenceResponse>;
    fn finalize(&mut self);
}

/// Load-time arguments from the host. Every value is a string.
#[derive(Clone, Debug, Default)]
pub struct InitArgs {
    /// JSON rendering of the model configuration.
    pub model_config: String,
    pub model_instance_kind: String,
    pub model_instance_device_id: String,
    pub model_repository: String,
    pub model_version: String,
    pub model_name: String,
}

impl InitArgs {
    pub fn new(model_config: impl Into<String>) -> Self {
        Self {
            model_config: model_config.into(),
            ..Default::default()
        }
    }

    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            model_config: get("model_config"),
            model_instance_kind: get("model_instance_kind"),
            model_instance_device_id: get("model_instance_device_id"),
            model_repository: get("model_repository"),
            model_version: get("model_version"),
            model_name: get("model_name"),
        }
    }

    pub fn config(&self) -> Result<ModelConfig> {
        ModelConfig::from_json(&self.model_config)
    }

    /// The device the host asked for. Anything but an explicit CPU instance prefers the
    /// accelerator.
    pub fn preferred_device(&self) -> Result<Device> {
        if self.model_instance_kind.eq_ignore_ascii_case("KIND_CPU") {
            return Ok(Device::Cpu);
        }
        let raw = self.model_instance_device_id.trim();
        let device_id = if raw.is_empty() {
            0
        } else {
            raw.parse()
                .with_context(|| format!("invalid model_instance_device_id: {raw}"))?
        };
        Ok(Device::Cuda { device_id })
    }
}

/// Binds the preferred device to what the backend can actually drive.
pub fn resolve_device(args: &InitArgs, caps: &BackendCapabilities) -> Result<Device> {
    let preferred = args.preferred_device()?;
    match preferred {
        Device::Cuda { device_id } if !caps.supports_cuda => {
            if args.model_instance_kind.eq_ignore_ascii_case("KIND_GPU") {
                warn!(device_id, "GPU instance requested but backend has no CUDA support, using CPU");
            }
            Ok(Device::Cpu)
        }
        device => Ok(device),
    }
}
