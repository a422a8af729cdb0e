use std::path::Path;

use anyhow::{bail, Context, Result};
use blipserve_core::Device;
use ndarray::ArrayD;
use ort::{
    session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session, SessionInputValue, SessionOutputs},
    value::Tensor as OrtTensor,
};

pub(crate) type NamedInput = (String, SessionInputValue<'static>);

pub(crate) fn load_session(path: &Path, device: &Device, intra_threads: usize) -> Result<Session> {
    let builder = Session::builder()
        .context("failed to create ORT session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("failed to configure ORT session builder")?
        .with_intra_threads(intra_threads)
        .context("failed to configure ORT intra-op threads")?;

    let builder = configure_session_builder(builder, device)?;

    builder
        .commit_from_file(path)
        .with_context(|| format!("failed to load ONNX graph {}", path.display()))
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but blipserve-backend-ort was built without the `cuda` feature")
    }
}

pub(crate) fn f32_input(name: &str, shape: Vec<usize>, data: Vec<f32>) -> Result<NamedInput> {
    let value = OrtTensor::from_array((shape, data))
        .with_context(|| format!("failed to build f32 input {name}"))?
        .into_dyn();
    Ok((name.to_string(), SessionInputValue::from(value)))
}

pub(crate) fn i64_input(name: &str, shape: Vec<usize>, data: Vec<i64>) -> Result<NamedInput> {
    let value = OrtTensor::from_array((shape, data))
        .with_context(|| format!("failed to build i64 input {name}"))?
        .into_dyn();
    Ok((name.to_string(), SessionInputValue::from(value)))
}

pub(crate) fn extract_f32(outputs: &SessionOutputs<'_>, name: &str) -> Result<ArrayD<f32>> {
    let value = outputs
        .get(name)
        .with_context(|| format!("graph produced no output named {name}"))?;
    let array = value
        .try_extract_array::<f32>()
        .with_context(|| format!("output {name} is not an f32 tensor"))?;
    Ok(array.to_owned())
}
