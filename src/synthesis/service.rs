//! Synthesis service seam
//!
//! `SynthesisService` is what the client drives. `WebUiClient` talks to a
//! real Stable Diffusion WebUI; `MockSynthesis` stands in for it in tests and
//! dry runs.

use serde::{Deserialize, Serialize};

use super::request::GenerationRequest;
use crate::error::Result;

/// Raw result of a generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Base64-encoded images, first one is the result
    #[serde(default)]
    pub images: Vec<String>,
    /// Service-side metadata, passed through untouched
    #[serde(default)]
    pub info: String,
}

/// One progress sample reported while a generation runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Completion in 0.0..=1.0
    pub fraction: f32,
    /// Estimated seconds remaining
    pub eta_relative: f32,
    pub status_text: String,
    /// Base64 preview of the in-progress image, if the service sent one
    pub preview_image: Option<String>,
    /// The service reports the job as interrupted
    pub interrupted: bool,
}

impl ProgressSample {
    /// Polling can stop once the job is finished or interrupted
    pub fn is_terminal(&self) -> bool {
        self.fraction >= 1.0 || self.interrupted
    }

    pub fn percent(&self) -> u32 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Remote image generation backend
pub trait SynthesisService: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run one generation to completion
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Progress of the job currently running on the service
    fn progress(&self) -> Result<ProgressSample>;

    /// Ask the service to stop the running job
    fn interrupt(&self) -> Result<()>;
}
