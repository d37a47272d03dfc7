//! Image synthesis
//!
//! Request construction, the service seam, the WebUI client and the
//! submit/poll/decode cycle.

pub mod builder;
pub mod client;
pub mod mock;
pub mod request;
pub mod service;
pub mod webui;

pub use builder::{
    conditioning_layers, inpaint_request, output_resolution, reference_data_uri,
    ConditioningConfigBuilder, ConditioningModule, ConditioningToggles, Orientation,
};
pub use client::{CancelToken, JobHandle, SynthesisClient};
pub use mock::MockSynthesis;
pub use request::{ConditioningLayer, DetailPass, Endpoint, GenerationRequest, InpaintSettings};
pub use service::{GenerationResponse, ProgressSample, SynthesisService};
pub use webui::WebUiClient;
