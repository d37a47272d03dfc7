//! Orchestrator Tests
//!
//! Mask chains driven against the in-process synthesis service.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cheki::assets::SourceImage;
use cheki::config::InpaintDefaults;
use cheki::orchestrator::{mask, ChainState, MaskOrchestrator, MaskStep};
use cheki::synthesis::mock::mock_color;
use cheki::synthesis::{CancelToken, MockSynthesis, SynthesisClient};
use cheki::ChekiError;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

const SIZE: u32 = 32;
const GREY: Rgba<u8> = Rgba([128, 128, 128, 255]);

fn setup(mock: MockSynthesis) -> (Arc<MockSynthesis>, SynthesisClient) {
    let mock = Arc::new(mock);
    let client = SynthesisClient::new(mock.clone(), Duration::from_millis(5));
    (mock, client)
}

fn initial() -> SourceImage {
    SourceImage::from_dynamic(
        "initial",
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(SIZE, SIZE, GREY)),
    )
}

/// Mask covering one horizontal quarter of the image
fn quarter_mask(quarter: u32) -> GrayImage {
    let band = SIZE / 4;
    GrayImage::from_fn(SIZE, SIZE, |x, _| {
        if x / band == quarter {
            mask::MASK_ON
        } else {
            mask::MASK_OFF
        }
    })
}

fn steps(n: u32) -> Vec<MaskStep> {
    (0..n)
        .map(|i| MaskStep::new(quarter_mask(i), format!("edit {}", i)).with_negative("blurry"))
        .collect()
}

fn decode_init_image(encoded: &str) -> RgbaImage {
    let bytes = BASE64.decode(encoded).unwrap();
    image::load_from_memory(&bytes).unwrap().into_rgba8()
}

// === Chain Success Tests ===

#[test]
fn test_each_step_feeds_the_next() {
    let (mock, client) = setup(MockSynthesis::new());
    let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());

    let result = chain.run(&initial(), &steps(3)).unwrap();
    assert_eq!(chain.state(), ChainState::Completed);
    assert_eq!(mock.call_count(), 3);

    // step 1 starts from the image step 0 produced
    let requests = mock.requests();
    let second_input = decode_init_image(&requests[1].inpaint.as_ref().unwrap().init_image);
    assert_eq!(*second_input.get_pixel(1, 0), mock_color(0));
    assert_eq!(*second_input.get_pixel(SIZE - 1, 0), GREY);

    // the final image carries every edit
    let pixels = result.pixels();
    assert_eq!(*pixels.get_pixel(1, 0), mock_color(0));
    assert_eq!(*pixels.get_pixel(SIZE / 4 + 1, 0), mock_color(1));
    assert_eq!(*pixels.get_pixel(SIZE / 2 + 1, 0), mock_color(2));
    assert_eq!(*pixels.get_pixel(SIZE - 1, 0), GREY);
}

#[test]
fn test_step_prompts_are_sent_in_order() {
    let (mock, client) = setup(MockSynthesis::new());
    let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());
    chain.run(&initial(), &steps(3)).unwrap();

    let prompts: Vec<_> = mock.requests().into_iter().map(|r| r.prompt).collect();
    assert_eq!(prompts, vec!["edit 0", "edit 1", "edit 2"]);
    assert!(mock
        .requests()
        .iter()
        .all(|r| r.negative_prompt == "blurry" && r.inpaint.is_some()));
}

// === Chain Failure Tests ===

#[test]
fn test_second_step_failure_stops_chain() {
    let (mock, client) = setup(MockSynthesis::new().fail_call(1, 500, "CUDA out of memory"));
    let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());

    let err = chain.run(&initial(), &steps(3)).unwrap_err();
    match &err {
        ChekiError::Chain {
            failed_step_index,
            cause,
        } => {
            assert_eq!(*failed_step_index, 1);
            assert_eq!(cause.error_code(), "SYNTHESIS_ERROR");
        }
        other => panic!("unexpected error {other:?}"),
    }
    // step 3 was never submitted
    assert_eq!(mock.call_count(), 2);
    assert_eq!(chain.state(), ChainState::Failed(1));
    assert_eq!(
        chain.history(),
        &[
            ChainState::Idle,
            ChainState::Running(0),
            ChainState::Running(1),
            ChainState::Failed(1)
        ]
    );
    assert!(err.user_message().contains("Mask step 2"));
}

#[test]
fn test_rerun_restarts_from_first_step() {
    let (mock, client) = setup(MockSynthesis::new().unavailable_on_call(0));
    let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());

    assert!(chain.run(&initial(), &steps(2)).is_err());
    assert_eq!(chain.state(), ChainState::Failed(0));

    chain.run(&initial(), &steps(2)).unwrap();
    assert_eq!(chain.state(), ChainState::Completed);
    assert_eq!(chain.history()[1], ChainState::Running(0));
    assert_eq!(mock.call_count(), 3);
}

#[test]
fn test_empty_response_is_reported_with_step() {
    let (_mock, client) = setup(MockSynthesis::new().empty_on_call(0));
    let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());
    let err = chain.run(&initial(), &steps(1)).unwrap_err();
    assert_eq!(err.error_code(), "CHAIN_ERROR");
}

#[test]
fn test_cancelled_chain_fails_at_current_step() {
    let (mock, client) = setup(MockSynthesis::new());
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut chain =
        MaskOrchestrator::new(&client, InpaintDefaults::default()).with_cancel_token(cancel);

    let err = chain.run(&initial(), &steps(2)).unwrap_err();
    match err {
        ChekiError::Chain {
            failed_step_index,
            cause,
        } => {
            assert_eq!(failed_step_index, 0);
            assert!(matches!(*cause, ChekiError::Cancelled));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(mock.call_count(), 0);
}

// === Mask Tests ===

#[test]
fn test_inverted_mask_repaints_outside() {
    let (_mock, client) = setup(MockSynthesis::new());
    let defaults = InpaintDefaults {
        invert_mask: true,
        ..InpaintDefaults::default()
    };
    let mut chain = MaskOrchestrator::new(&client, defaults);
    let result = chain.run(&initial(), &steps(1)).unwrap();
    assert_eq!(*result.pixels().get_pixel(1, 0), GREY);
    assert_eq!(*result.pixels().get_pixel(SIZE - 1, 0), mock_color(0));
}
