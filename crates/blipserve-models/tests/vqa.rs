mod common;

use std::path::PathBuf;

use anyhow::Result;
use blipserve_core::{DType, Device, InferError, ModelArtifact, Shape, Tensor};
use blipserve_models::{VqaAdapter, DEFAULT_VQA_CHECKPOINT, VQA_ANSWER_OUTPUT};
use blipserve_runtime::{Adapter, InitArgs, ModelInstance};
use common::{init_args, model_config, paths, request, strings, FakeBackend, Gallery};

fn vqa_config(parameters: &[(&str, &str)]) -> String {
    model_config("blip_vqa", VQA_ANSWER_OUTPUT, "TYPE_STRING", parameters)
}

fn answers(tensor: &Tensor) -> Result<Vec<String>> {
    Ok(tensor
        .strings()?
        .iter()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .collect())
}

#[test_log::test]
fn batch_of_requests_is_answered_in_order() -> Result<()> {
    let gallery = Gallery::new()?;
    let beach = gallery.image("beach.png", 4, 3)?;
    let merlion = gallery.image("merlion.png", 2, 5)?;

    let backend = FakeBackend::new(8);
    let mut instance = ModelInstance::load(VqaAdapter::new(backend), &init_args(vqa_config(&[])))?;

    let batch = vec![
        request(
            "r0",
            vec![
                ("INPUT0", paths(&[beach, merlion.clone()])?),
                ("INPUT1", strings(&["where is the woman sitting?", ""])?),
            ],
        ),
        request(
            "r1",
            vec![
                ("INPUT0", paths(&[merlion])?),
                ("INPUT1", strings(&["which city is this photo taken?"])?),
            ],
        ),
    ];
    let responses = instance.execute(batch)?;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].id.as_deref(), Some("r0"));
    assert_eq!(
        answers(responses[0].output(VQA_ANSWER_OUTPUT).unwrap())?,
        vec!["where is the woman sitting? -> 4x3", " -> 2x5"]
    );
    assert_eq!(
        answers(responses[1].output(VQA_ANSWER_OUTPUT).unwrap())?,
        vec!["which city is this photo taken? -> 2x5"]
    );
    Ok(())
}

#[test]
fn checkpoint_parameter_overrides_default() -> Result<()> {
    let backend = FakeBackend::new(4);
    let recorder = backend.clone();

    let config = vqa_config(&[("checkpoint", "/models/vqa")]);
    let _instance = ModelInstance::load(VqaAdapter::new(backend), &init_args(config))?;

    assert_eq!(recorder.loads()[0].0, ModelArtifact::BlipVqa("/models/vqa".into()));
    assert_eq!(recorder.loads()[0].1, Device::Cpu);
    Ok(())
}

#[test]
fn missing_checkpoint_fails_initialize() {
    let config = vqa_config(&[("checkpoint", "/missing/vqa")]);
    let mut adapter = VqaAdapter::new(FakeBackend::new(4));

    let err = adapter.initialize(&init_args(config)).unwrap_err();
    assert!(format!("{err:#}").contains("/missing/vqa"), "{err:#}");
    assert!(!adapter.is_loaded());
}

#[test]
fn non_string_answer_type_is_rejected_at_load() {
    let config = model_config("blip_vqa", VQA_ANSWER_OUTPUT, "TYPE_INT64", &[]);
    let err = VqaAdapter::new(FakeBackend::new(4))
        .initialize(&init_args(config))
        .unwrap_err();
    assert!(err.to_string().contains("TYPE_INT64"), "{err}");
}

#[test]
fn undeclared_output_is_rejected_at_load() {
    let config = model_config("blip_vqa", "ANSWER", "TYPE_STRING", &[]);
    assert!(VqaAdapter::new(FakeBackend::new(4))
        .initialize(&init_args(config))
        .is_err());
}

#[test]
fn malformed_config_json_is_rejected_at_load() {
    let mut adapter = VqaAdapter::new(FakeBackend::new(4));
    assert!(adapter.initialize(&InitArgs::new("{not json")).is_err());
}

#[test]
fn bad_requests_fail_alone() -> Result<()> {
    let gallery = Gallery::new()?;
    let a = gallery.image("a.png", 2, 2)?;
    let b = gallery.image("b.png", 3, 3)?;
    let mut instance =
        ModelInstance::load(VqaAdapter::new(FakeBackend::new(4)), &init_args(vqa_config(&[])))?;

    let good = || -> Result<_> {
        Ok(vec![
            ("INPUT0", paths(&[a.clone()])?),
            ("INPUT1", strings(&["what?"])?),
        ])
    };
    let batch = vec![
        request("missing", vec![("INPUT0", paths(&[a.clone()])?)]),
        request("ok", good()?),
        request(
            "mismatch",
            vec![("INPUT0", paths(&[a.clone(), b.clone()])?), ("INPUT1", strings(&["one?"])?)],
        ),
        request(
            "wrong-type",
            vec![
                ("INPUT0", paths(&[a.clone()])?),
                ("INPUT1", Tensor::from_i64s(Shape::vector(1), &[7])?),
            ],
        ),
        request(
            "not-utf8",
            vec![
                ("INPUT0", paths(&[a.clone()])?),
                ("INPUT1", Tensor::from_strings(Shape::vector(1), [&[0xffu8, 0xfe][..]])?),
            ],
        ),
        request(
            "model-failure",
            vec![("INPUT0", paths(&[a.clone()])?), ("INPUT1", strings(&["boom"])?)],
        ),
        request("ok-again", good()?),
    ];
    let responses = instance.execute(batch)?;

    let errors: Vec<_> = responses.iter().map(|r| r.result.as_ref().err().cloned()).collect();
    assert_eq!(errors[0], Some(InferError::MissingInput("INPUT1".into())));
    assert_eq!(errors[1], None);
    assert!(matches!(errors[2], Some(InferError::CountMismatch(_))));
    assert_eq!(
        errors[3],
        Some(InferError::WrongType { name: "INPUT1".into(), expected: "BYTES", actual: "INT64" })
    );
    assert_eq!(errors[4], Some(InferError::InvalidText { name: "INPUT1".into(), index: 0 }));
    assert!(matches!(&errors[5], Some(InferError::Model(msg)) if msg.contains("out of memory")));
    assert_eq!(errors[6], None);
    Ok(())
}

#[test]
fn unreadable_images_are_input_errors_not_model_failures() -> Result<()> {
    let gallery = Gallery::new()?;
    let good = gallery.image("good.png", 2, 2)?;
    let backend = FakeBackend::new(4);
    let calls = backend.clone();
    let mut instance = ModelInstance::load(VqaAdapter::new(backend), &init_args(vqa_config(&[])))?;

    let corrupt = Tensor::from_strings(
        Shape::vector(1),
        [&b"\x89PNG\r\n\x1a\ntruncated"[..]],
    )?;
    let responses = instance.execute(vec![
        request(
            "missing-file",
            vec![
                ("INPUT0", paths(&[good.clone(), "/no/such/beach.png".to_string()])?),
                ("INPUT1", strings(&["q0", "q1"])?),
            ],
        ),
        request("corrupt", vec![("INPUT0", corrupt), ("INPUT1", strings(&["q"])?)]),
        request("fine", vec![("INPUT0", paths(&[good])?), ("INPUT1", strings(&["q"])?)]),
    ])?;

    match &responses[0].result {
        Err(InferError::InvalidImage { name, index, reason }) => {
            assert_eq!((name.as_str(), *index), ("INPUT0", 1));
            assert!(reason.contains("/no/such/beach.png"), "{reason}");
        }
        other => panic!("expected an invalid image, got {other:?}"),
    }
    assert!(matches!(
        responses[1].result,
        Err(InferError::InvalidImage { ref name, index: 0, .. }) if name == "INPUT0"
    ));
    assert!(responses[2].is_ok());
    // only the healthy request reached the model
    assert_eq!(calls.call_sizes(), vec![1]);
    Ok(())
}

#[test]
fn modal_level_batching_changes_calls_not_answers() -> Result<()> {
    let gallery = Gallery::new()?;
    let images = (1..=5)
        .map(|n| gallery.image(&format!("img{n}.png"), n, n + 1))
        .collect::<Result<Vec<_>>>()?;
    let questions = ["q0", "q1", "q2", "q3", "q4"];

    let mut results = Vec::new();
    for (flag, expected_calls) in [("true", vec![2, 2, 1]), ("false", vec![1; 5])] {
        let backend = FakeBackend::new(2);
        let recorder = backend.clone();
        let config = vqa_config(&[("modal_level_batch", flag)]);
        let mut instance = ModelInstance::load(VqaAdapter::new(backend), &init_args(config))?;

        let responses = instance.execute(vec![request(
            "r",
            vec![("INPUT0", paths(&images)?), ("INPUT1", strings(&questions)?)],
        )])?;
        assert_eq!(recorder.call_sizes(), expected_calls);
        results.push(answers(responses[0].output(VQA_ANSWER_OUTPUT).unwrap())?);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0][4], "q4 -> 5x6");
    Ok(())
}

#[test]
fn repeated_calls_are_deterministic() -> Result<()> {
    let gallery = Gallery::new()?;
    let x = gallery.image("x.png", 3, 2)?;
    let mut instance =
        ModelInstance::load(VqaAdapter::new(FakeBackend::new(4)), &init_args(vqa_config(&[])))?;
    let make = || -> Result<_> {
        Ok(vec![request(
            "r",
            vec![("INPUT0", paths(&[x.clone()])?), ("INPUT1", strings(&["why?"])?)],
        )])
    };

    let first = instance.execute(make()?)?;
    let second = instance.execute(make()?)?;
    assert!(first[0].is_ok());
    assert_eq!(first[0].result, second[0].result);
    Ok(())
}

#[test]
fn output_keeps_question_shape_and_type() -> Result<()> {
    let gallery = Gallery::new()?;
    let a = gallery.image("a.png", 2, 2)?;
    let b = gallery.image("b.png", 2, 2)?;
    let mut instance =
        ModelInstance::load(VqaAdapter::new(FakeBackend::new(4)), &init_args(vqa_config(&[])))?;
    let shape = Shape::from_slice(&[2, 1]);
    let responses = instance.execute(vec![request(
        "r",
        vec![
            ("INPUT0", Tensor::from_strings(shape.clone(), [a, b])?),
            ("INPUT1", Tensor::from_strings(shape.clone(), ["q0", "q1"])?),
        ],
    )])?;

    let out = responses[0].output(VQA_ANSWER_OUTPUT).unwrap();
    assert_eq!(out.dtype, DType::Bytes);
    assert_eq!(out.shape, shape);
    Ok(())
}

#[test]
fn empty_request_produces_empty_answer_without_model_call() -> Result<()> {
    let backend = FakeBackend::new(4);
    let recorder = backend.clone();
    let mut instance = ModelInstance::load(VqaAdapter::new(backend), &init_args(vqa_config(&[])))?;

    let responses = instance.execute(vec![request(
        "r",
        vec![("INPUT0", strings(&[])?), ("INPUT1", strings(&[])?)],
    )])?;

    assert_eq!(responses[0].output(VQA_ANSWER_OUTPUT).unwrap().numel()?, 0);
    assert!(recorder.call_sizes().is_empty());
    Ok(())
}

#[test]
fn execute_before_initialize_reports_per_request() -> Result<()> {
    let mut adapter = VqaAdapter::new(FakeBackend::new(4));
    let responses = adapter.execute(vec![request("r", Vec::new())]);

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].result.as_ref().unwrap_err(), &InferError::NotInitialized);
    Ok(())
}

#[test]
fn finalize_releases_model() -> Result<()> {
    let mut adapter = VqaAdapter::new(FakeBackend::new(4));
    adapter.initialize(&init_args(vqa_config(&[])))?;
    assert!(adapter.is_loaded());

    adapter.finalize();
    adapter.finalize();
    assert!(!adapter.is_loaded());
    Ok(())
}
