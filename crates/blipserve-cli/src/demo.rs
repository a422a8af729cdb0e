use anyhow::{bail, Context, Result};
use blipserve_core::{DType, IOName, Shape, Tensor};
use blipserve_models::{
    NLVR_ANSWER_OUTPUT, NLVR_LEFT_INPUT, NLVR_RIGHT_INPUT, NLVR_TEXT_INPUT, VQA_ANSWER_OUTPUT,
    VQA_IMAGE_INPUT, VQA_QUESTION_INPUT,
};
use tracing::info;

use crate::cli::DemoTask;
use crate::client::InferenceClient;

pub(crate) const NLVR_DEMO_IMAGE0: [&str; 2] = [
    "/workspace/demos/images/ex0_0.jpg",
    "/workspace/demos/images/acorns_1.jpg",
];
pub(crate) const NLVR_DEMO_IMAGE1: [&str; 2] = [
    "/workspace/demos/images/ex0_1.jpg",
    "/workspace/demos/images/acorns_6.jpg",
];
pub(crate) const NLVR_DEMO_TEXT: [&str; 2] = [
    "The left image contains twice the number of dogs as the right image, and at least two dogs in total are standing.",
    "One image shows exactly two brown acorns in back-to-back caps on green foliage.",
];

pub(crate) const VQA_DEMO_IMAGES: [&str; 4] = [
    "/workspace/examples/beach.jpg",
    "/workspace/examples/beach.jpg",
    "/workspace/examples/merlion.png",
    "/workspace/examples/merlion.png",
];
pub(crate) const VQA_DEMO_QUESTIONS: [&str; 4] = [
    "where is the woman sitting?",
    "where is the dog sitting?",
    "",
    "which city is this photo taken?",
];

pub async fn run(url: &str, task: DemoTask) -> Result<()> {
    let client = InferenceClient::new(url)?;
    info!(server = client.base_url(), "demo client");

    match task {
        DemoTask::Nlvr {
            model,
            image0,
            image1,
            text,
            loop_size,
            request_id,
        } => {
            let image0 = batch_or_default(image0, &NLVR_DEMO_IMAGE0, loop_size);
            let image1 = batch_or_default(image1, &NLVR_DEMO_IMAGE1, loop_size);
            let text = batch_or_default(text, &NLVR_DEMO_TEXT, loop_size);

            let inputs = vec![
                (IOName::new(NLVR_LEFT_INPUT), string_tensor(&image0)?),
                (IOName::new(NLVR_RIGHT_INPUT), string_tensor(&image1)?),
                (IOName::new(NLVR_TEXT_INPUT), string_tensor(&text)?),
            ];
            let outputs = client
                .infer(&model, &request_id, &inputs, &[NLVR_ANSWER_OUTPUT])
                .await?;
            let answers = render(find_output(&outputs, NLVR_ANSWER_OUTPUT)?)?;

            println!("IMAGE0 ({image0:?}) + IMAGE1 ({image1:?}) + TEXT ({text:?}) = ANSWER ({answers:?})");
        }
        DemoTask::Vqa {
            model,
            image,
            question,
            loop_size,
            request_id,
        } => {
            let image = batch_or_default(image, &VQA_DEMO_IMAGES, loop_size);
            let question = batch_or_default(question, &VQA_DEMO_QUESTIONS, loop_size);

            let inputs = vec![
                (IOName::new(VQA_IMAGE_INPUT), string_tensor(&image)?),
                (IOName::new(VQA_QUESTION_INPUT), string_tensor(&question)?),
            ];
            let outputs = client
                .infer(&model, &request_id, &inputs, &[VQA_ANSWER_OUTPUT])
                .await?;
            let answers = render(find_output(&outputs, VQA_ANSWER_OUTPUT)?)?;

            println!("INPUT0 ({image:?}) + INPUT1 ({question:?}) = OUTPUT0 ({answers:?})");
        }
        DemoTask::Ready { model } => {
            let ready = client.model_ready(&model).await?;
            println!("{model}: {}", if ready { "ready" } else { "not ready" });
            if !ready {
                bail!("model {model} is not ready");
            }
        }
    }
    Ok(())
}

pub(crate) fn batch_or_default(given: Vec<String>, default: &[&str], loop_size: usize) -> Vec<String> {
    let base: Vec<String> = if given.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        given
    };
    let mut out = Vec::with_capacity(base.len() * loop_size.max(1));
    for _ in 0..loop_size.max(1) {
        out.extend(base.iter().cloned());
    }
    out
}

pub(crate) fn string_tensor(items: &[String]) -> Result<Tensor> {
    Tensor::from_strings(Shape::vector(items.len()), items)
}

pub(crate) fn find_output<'a>(outputs: &'a [(IOName, Tensor)], name: &str) -> Result<&'a Tensor> {
    outputs
        .iter()
        .find(|(n, _)| n.as_str() == name)
        .map(|(_, t)| t)
        .with_context(|| format!("response carries no {name} output"))
}

pub(crate) fn render(tensor: &Tensor) -> Result<Vec<String>> {
    Ok(match tensor.dtype {
        DType::Bytes => tensor
            .strings()?
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect(),
        DType::Bool => tensor.bools()?.iter().map(bool::to_string).collect(),
        DType::U8 => tensor.data.iter().map(u8::to_string).collect(),
        DType::I32 => tensor.i32s()?.iter().map(i32::to_string).collect(),
        DType::I64 => tensor.i64s()?.iter().map(i64::to_string).collect(),
        DType::F32 => tensor.f32s()?.iter().map(f32::to_string).collect(),
        DType::F16 => bail!("FP16 answers are not supported"),
    })
}
