use std::path::Path;

use anyhow::{ensure, Context, Result};
use blipserve_backend_ort::OrtBackend;
use blipserve_core::{Device, IOName, Tensor};
use blipserve_models::{
    NlvrAdapter, VqaAdapter, CHECKPOINT_PARAMETER, MODAL_LEVEL_BATCH_PARAMETER,
    NLVR_ANSWER_OUTPUT, NLVR_LEFT_INPUT, NLVR_RIGHT_INPUT, NLVR_TEXT_INPUT, VQA_ANSWER_OUTPUT,
    VQA_IMAGE_INPUT, VQA_QUESTION_INPUT,
};
use blipserve_runtime::{Adapter, InferenceRequest, InferenceResponse, InitArgs, ModelInstance};
use serde_json::json;
use tracing::info;

use crate::cli::SmokeTask;
use crate::demo::{
    batch_or_default, find_output, render, string_tensor, NLVR_DEMO_IMAGE0, NLVR_DEMO_IMAGE1,
    NLVR_DEMO_TEXT, VQA_DEMO_IMAGES, VQA_DEMO_QUESTIONS,
};

/// Runs the same batch with modal-level batching on and then off.
pub fn run(task: SmokeTask, device: Device) -> Result<()> {
    match task {
        SmokeTask::Vqa {
            checkpoint,
            image,
            question,
        } => {
            let image = batch_or_default(image, &VQA_DEMO_IMAGES, 1);
            let question = batch_or_default(question, &VQA_DEMO_QUESTIONS, 1);
            println!("{image:?}");
            println!("{question:?}");

            let inputs = vec![
                (IOName::new(VQA_IMAGE_INPUT), string_tensor(&image)?),
                (IOName::new(VQA_QUESTION_INPUT), string_tensor(&question)?),
            ];
            for modal_level_batch in [true, false] {
                let args = init_args(
                    "blip_vqa",
                    VQA_ANSWER_OUTPUT,
                    &checkpoint,
                    modal_level_batch,
                    &device,
                );
                let adapter = VqaAdapter::new(OrtBackend::new());
                let answers = run_once(adapter, &args, &inputs, VQA_ANSWER_OUTPUT)?;
                println!("{answers:?}");
            }
        }
        SmokeTask::Nlvr {
            checkpoint,
            image0,
            image1,
            text,
        } => {
            let image0 = batch_or_default(image0, &NLVR_DEMO_IMAGE0, 1);
            let image1 = batch_or_default(image1, &NLVR_DEMO_IMAGE1, 1);
            let text = batch_or_default(text, &NLVR_DEMO_TEXT, 1);

            let inputs = vec![
                (IOName::new(NLVR_LEFT_INPUT), string_tensor(&image0)?),
                (IOName::new(NLVR_RIGHT_INPUT), string_tensor(&image1)?),
                (IOName::new(NLVR_TEXT_INPUT), string_tensor(&text)?),
            ];
            for modal_level_batch in [true, false] {
                let args = init_args(
                    "blip_nlvr",
                    NLVR_ANSWER_OUTPUT,
                    &checkpoint,
                    modal_level_batch,
                    &device,
                );
                let adapter = NlvrAdapter::new(OrtBackend::new());
                let answers = run_once(adapter, &args, &inputs, NLVR_ANSWER_OUTPUT)?;
                println!("{answers:?}");
            }
        }
    }
    Ok(())
}

fn run_once<A: Adapter>(
    adapter: A,
    args: &InitArgs,
    inputs: &[(IOName, Tensor)],
    output: &str,
) -> Result<Vec<String>> {
    let mut instance = ModelInstance::load(adapter, args)?;
    let request = InferenceRequest::new(Some("smoke".to_string()), inputs.to_vec());

    let mut responses = instance.execute(vec![request])?;
    ensure!(responses.len() == 1, "expected one response");
    let InferenceResponse {
        result, backend_us, ..
    } = responses.remove(0);
    let outputs = result.context("smoke request failed")?;
    info!(backend_us, "smoke batch done");

    instance.finalize();
    render(find_output(&outputs, output)?)
}

fn init_args(
    name: &str,
    output: &str,
    checkpoint: &Path,
    modal_level_batch: bool,
    device: &Device,
) -> InitArgs {
    let config = json!({
        "name": name,
        "backend": "blipserve",
        "output": [{ "name": output, "data_type": "TYPE_STRING", "dims": [-1] }],
        "parameters": {
            CHECKPOINT_PARAMETER: { "string_value": checkpoint.display().to_string() },
            MODAL_LEVEL_BATCH_PARAMETER: { "string_value": modal_level_batch.to_string() },
        },
    });

    let mut args = InitArgs::new(config.to_string());
    args.model_name = name.to_string();
    match device {
        Device::Cpu => args.model_instance_kind = "KIND_CPU".to_string(),
        Device::Cuda { device_id } => {
            args.model_instance_kind = "KIND_GPU".to_string();
            args.model_instance_device_id = device_id.to_string();
        }
    }
    args
}
