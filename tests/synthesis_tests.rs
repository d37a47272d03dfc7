//! Synthesis Tests
//!
//! Request building, the poll loop and the WebUI client against an
//! unreachable endpoint.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use cheki::config::GenerationDefaults;
use cheki::session::Session;
use cheki::synthesis::{
    CancelToken, ConditioningConfigBuilder, ConditioningToggles, MockSynthesis, Orientation,
    SynthesisClient, SynthesisService, WebUiClient,
};
use cheki::ChekiError;
use pretty_assertions::assert_eq;
use serde_json::json;

fn builder() -> ConditioningConfigBuilder {
    ConditioningConfigBuilder::from_defaults(&GenerationDefaults::default())
}

fn client(mock: &Arc<MockSynthesis>) -> SynthesisClient {
    SynthesisClient::new(mock.clone(), Duration::from_millis(10))
}

// === Request Builder Tests ===

#[test]
fn test_high_res_halves_both_dimensions() {
    for orientation in [Orientation::Portrait, Orientation::Landscape] {
        let full = builder().orientation(orientation).high_res(false).build().unwrap();
        let half = builder().orientation(orientation).high_res(true).build().unwrap();
        assert_eq!(half.width * 2, full.width);
        assert_eq!(half.height * 2, full.height);
    }
}

#[test]
fn test_orientations_use_complementary_pairs() {
    let portrait = builder().orientation(Orientation::Portrait).high_res(false).build().unwrap();
    let landscape = builder().orientation(Orientation::Landscape).high_res(false).build().unwrap();
    assert_eq!((portrait.width, portrait.height), (1024, 1360));
    assert_eq!((landscape.width, landscape.height), (1360, 1024));
}

#[test]
fn test_payload_field_names() {
    let request = builder()
        .prompt("smile")
        .negative_prompt("blurry")
        .seed(7)
        .toggles(ConditioningToggles {
            canny: true,
            depth: false,
            lineart: false,
            tile: false,
        })
        .detail_pass(false)
        .build()
        .unwrap();
    let payload = request.to_payload();

    assert_eq!(payload["prompt"], json!("smile"));
    assert_eq!(payload["negative_prompt"], json!("blurry"));
    assert_eq!(payload["seed"], json!(7));
    assert_eq!(payload["steps"], json!(20));
    assert_eq!(payload["sampler_name"], json!("DPM++ 2M Karras"));
    assert_eq!(payload["enable_hr"], json!(true));
    assert_eq!(payload["hr_scale"], json!(2.0));
    assert_eq!(
        payload["override_settings"]["sd_model_checkpoint"],
        json!("flat2DAnimerge_v45Sharp [fe95063ba6]")
    );
    assert_eq!(
        payload["alwayson_scripts"]["controlnet"]["args"],
        json!([{
            "enabled": true,
            "module": "canny",
            "model": "control_canny-fp16 [e3fe7712]",
            "weight": 1.0,
            "resize_mode": "Crop and Resize",
            "processor_res": 512,
            "guidance_start": 0.0,
            "guidance_end": 1.0,
            "control_mode": "Balanced"
        }])
    );
    assert!(payload["alwayson_scripts"].get("adetailer").is_none());
}

#[test]
fn test_no_layers_means_no_controlnet_script() {
    let request = builder()
        .toggles(ConditioningToggles::none())
        .detail_pass(false)
        .build()
        .unwrap();
    assert!(request.conditioning_layers.is_empty());
    assert!(request.to_payload().get("alwayson_scripts").is_none());
}

// === Poll Loop Tests ===

#[test]
fn test_generate_reports_progress_and_decodes() {
    let mock = Arc::new(
        MockSynthesis::new()
            .with_latency(Duration::from_millis(200))
            .with_progress_step(0.5),
    );
    let request = builder().high_res(false).build().unwrap();

    let mut fractions = Vec::new();
    let image = client(&mock)
        .generate(request, &CancelToken::new(), |s| fractions.push(s.fraction))
        .unwrap();

    assert_eq!((image.width(), image.height()), (1024, 1360));
    // polling stops once the service reports completion
    assert_eq!(fractions.len(), 2);
    assert_relative_eq!(fractions[1], 1.0);
    assert_eq!(mock.call_count(), 1);
}

#[test]
fn test_cancel_sends_one_interrupt() {
    let mock = Arc::new(MockSynthesis::new().with_latency(Duration::from_millis(300)));
    let cancel = CancelToken::new();
    let trigger = cancel.clone();

    let err = client(&mock)
        .generate(builder().build().unwrap(), &cancel, |_| trigger.cancel())
        .unwrap_err();

    assert!(matches!(err, ChekiError::Cancelled));
    assert_eq!(mock.interrupt_count(), 1);
}

#[test]
fn test_cancelled_before_submit_never_calls_service() {
    let mock = Arc::new(MockSynthesis::new());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = client(&mock)
        .generate(builder().build().unwrap(), &cancel, |_| {})
        .unwrap_err();
    assert_eq!(err.error_code(), "CANCELLED");
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn test_unreachable_progress_ends_loop_and_interrupts_job() {
    let mock = Arc::new(
        MockSynthesis::new()
            .with_latency(Duration::from_millis(500))
            .with_unreachable_progress(),
    );
    let err = client(&mock)
        .generate(builder().build().unwrap(), &CancelToken::new(), |_| {})
        .unwrap_err();
    assert_eq!(err.error_code(), "SYNTHESIS_UNAVAILABLE");
    // the abandoned job is asked to stop once
    assert_eq!(mock.interrupt_count(), 1);
}

#[test]
fn test_service_error_keeps_status() {
    let mock = Arc::new(MockSynthesis::new().fail_call(0, 422, "bad sampler"));
    let err = client(&mock)
        .generate(builder().build().unwrap(), &CancelToken::new(), |_| {})
        .unwrap_err();
    match err {
        ChekiError::Synthesis { status, message } => {
            assert_eq!(status, Some(422));
            assert_eq!(message, "bad sampler");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

// === WebUI Client Tests ===

#[test]
fn test_webui_unreachable_is_terminal() {
    let webui = WebUiClient::with_base_url("http://127.0.0.1:1", 2_000, &Session::anonymous())
        .unwrap();
    let err = webui.progress().unwrap_err();
    assert!(
        matches!(
            err,
            ChekiError::SynthesisUnavailable { .. } | ChekiError::SynthesisTimeout { .. }
        ),
        "unexpected error {err:?}"
    );

    let client = SynthesisClient::new(Arc::new(webui), Duration::from_millis(10));
    let err = client
        .generate(builder().build().unwrap(), &CancelToken::new(), |_| {})
        .unwrap_err();
    assert!(!matches!(err, ChekiError::Cancelled));
}
