//! In-process synthesis service
//!
//! Does no diffusion at all. txt2img requests produce a flat image of the
//! final requested size; inpaint requests repaint the white mask region of
//! the init image with a colour picked by call number, so chained edits
//! leave a visible trail. Failures, latency and progress can be scripted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgba, RgbaImage};

use super::request::GenerationRequest;
use super::service::{GenerationResponse, ProgressSample, SynthesisService};
use crate::assets::encode_png;
use crate::error::{ChekiError, Result};

/// Colours used for successive calls
pub const MOCK_PALETTE: [Rgba<u8>; 4] = [
    Rgba([220, 40, 40, 255]),
    Rgba([40, 200, 60, 255]),
    Rgba([40, 80, 220, 255]),
    Rgba([230, 200, 30, 255]),
];

/// Colour the mock paints for the call at `index` (0-based)
pub fn mock_color(index: usize) -> Rgba<u8> {
    MOCK_PALETTE[index % MOCK_PALETTE.len()]
}

#[derive(Debug, Clone)]
enum ScriptedFailure {
    Status { status: u16, message: String },
    Unavailable,
    NoImages,
}

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<GenerationRequest>,
    failures: HashMap<usize, ScriptedFailure>,
    progress_calls: usize,
    interrupts: usize,
    interrupted: bool,
}

/// Scriptable stand-in for the WebUI
#[derive(Debug, Default)]
pub struct MockSynthesis {
    state: Mutex<MockState>,
    latency: Duration,
    progress_step: f32,
    progress_unreachable: bool,
}

impl MockSynthesis {
    pub fn new() -> Self {
        Self {
            progress_step: 0.25,
            ..Default::default()
        }
    }

    /// Sleep this long inside every generate call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Progress added per poll
    pub fn with_progress_step(mut self, step: f32) -> Self {
        self.progress_step = step;
        self
    }

    /// Every progress poll fails as if the service went away
    pub fn with_unreachable_progress(mut self) -> Self {
        self.progress_unreachable = true;
        self
    }

    /// Generate call `index` (0-based) answers with an HTTP error
    pub fn fail_call(self, index: usize, status: u16, message: impl Into<String>) -> Self {
        self.script(
            index,
            ScriptedFailure::Status {
                status,
                message: message.into(),
            },
        )
    }

    /// Generate call `index` cannot reach the service
    pub fn unavailable_on_call(self, index: usize) -> Self {
        self.script(index, ScriptedFailure::Unavailable)
    }

    /// Generate call `index` succeeds with an empty image list
    pub fn empty_on_call(self, index: usize) -> Self {
        self.script(index, ScriptedFailure::NoImages)
    }

    fn script(self, index: usize, failure: ScriptedFailure) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(index, failure);
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state.lock().map_err(|_| ChekiError::SynthesisUnavailable {
            reason: "mock state poisoned".to_string(),
        })
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.lock().map(|s| s.requests.len()).unwrap_or_default()
    }

    pub fn progress_calls(&self) -> usize {
        self.lock().map(|s| s.progress_calls).unwrap_or_default()
    }

    pub fn interrupt_count(&self) -> usize {
        self.lock().map(|s| s.interrupts).unwrap_or_default()
    }

    fn render(request: &GenerationRequest, index: usize) -> Result<RgbaImage> {
        let color = mock_color(index);
        let Some(inpaint) = &request.inpaint else {
            let (w, h) = request.final_size();
            return Ok(RgbaImage::from_pixel(w.max(1), h.max(1), color));
        };

        let mut canvas = decode_png(&inpaint.init_image)?;
        let mask = decode_png(&inpaint.mask)?;
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            if x >= mask.width() || y >= mask.height() {
                continue;
            }
            let white = mask.get_pixel(x, y).0[0] > 127;
            if white != inpaint.invert_mask {
                *pixel = color;
            }
        }
        Ok(canvas)
    }
}

fn decode_png(encoded: &str) -> Result<RgbaImage> {
    let bytes = BASE64.decode(encoded).map_err(|e| ChekiError::Decode {
        reason: e.to_string(),
    })?;
    Ok(image::load_from_memory(&bytes)?.into_rgba8())
}

impl SynthesisService for MockSynthesis {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let (index, failure) = {
            let mut state = self.lock()?;
            let index = state.requests.len();
            state.requests.push(request.clone());
            (index, state.failures.get(&index).cloned())
        };

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        // The next job starts from zero progress
        {
            let mut state = self.lock()?;
            state.progress_calls = 0;
            state.interrupted = false;
        }

        match failure {
            Some(ScriptedFailure::Status { status, message }) => {
                return Err(ChekiError::synthesis(Some(status), message))
            }
            Some(ScriptedFailure::Unavailable) => {
                return Err(ChekiError::SynthesisUnavailable {
                    reason: "mock service is down".to_string(),
                })
            }
            Some(ScriptedFailure::NoImages) => {
                return Err(ChekiError::synthesis(Some(200), "response contained no images"))
            }
            None => {}
        }

        let image = Self::render(request, index)?;
        tracing::debug!(call = index, "Mock generation finished");
        Ok(GenerationResponse {
            images: vec![BASE64.encode(encode_png(&image)?)],
            info: format!("{{\"mock_call\": {}}}", index),
        })
    }

    fn progress(&self) -> Result<ProgressSample> {
        if self.progress_unreachable {
            return Err(ChekiError::SynthesisUnavailable {
                reason: "mock progress endpoint unreachable".to_string(),
            });
        }
        let mut state = self.lock()?;
        state.progress_calls += 1;
        let fraction = (state.progress_calls as f32 * self.progress_step).min(1.0);
        Ok(ProgressSample {
            fraction,
            eta_relative: (1.0 - fraction) * 10.0,
            status_text: format!("Step {}", state.progress_calls),
            preview_image: None,
            interrupted: state.interrupted,
        })
    }

    fn interrupt(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.interrupts += 1;
        state.interrupted = true;
        Ok(())
    }
}
