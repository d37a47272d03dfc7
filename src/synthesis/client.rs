//! Submit / poll / cancel / decode cycle
//!
//! A generation call blocks for the whole job, so `submit` runs it on a
//! worker thread and hands back a `JobHandle`. The caller polls progress on
//! the configured interval until the worker settles. Nothing is retried: a
//! failed poll sends one interrupt and ends the loop with that error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use uuid::Uuid;

use super::request::GenerationRequest;
use super::service::{GenerationResponse, ProgressSample, SynthesisService};
use crate::assets::SourceImage;
use crate::error::{ChekiError, Result};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A submitted generation
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    submitted_at: Instant,
    result: Receiver<Result<GenerationResponse>>,
}

impl JobHandle {
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// Drives a `SynthesisService` through one generation at a time
#[derive(Clone)]
pub struct SynthesisClient {
    service: Arc<dyn SynthesisService>,
    poll_interval: Duration,
}

impl SynthesisClient {
    pub fn new(service: Arc<dyn SynthesisService>, poll_interval: Duration) -> Self {
        Self {
            service,
            poll_interval,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start a generation on a worker thread
    pub fn submit(&self, request: GenerationRequest) -> JobHandle {
        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.service);
        let id = Uuid::new_v4();
        tracing::info!(job = %id, endpoint = request.endpoint().path(), "Submitted generation");

        thread::spawn(move || {
            let result = service.generate(&request);
            // The receiver may be gone if polling already failed
            let _ = tx.send(result);
        });

        JobHandle {
            id,
            submitted_at: Instant::now(),
            result: rx,
        }
    }

    /// One progress sample for the running job
    pub fn poll_progress(&self, job: &JobHandle) -> Result<ProgressSample> {
        let sample = self.service.progress()?;
        tracing::debug!(
            job = %job.id,
            progress = sample.fraction,
            eta = sample.eta_relative,
            "Progress"
        );
        Ok(sample)
    }

    /// Ask the service to stop the job. Best effort: the job may still finish.
    pub fn cancel(&self, job: &JobHandle) -> Result<()> {
        tracing::info!(job = %job.id, "Cancelling generation");
        self.service.interrupt()
    }

    /// Block until the job settles
    pub fn wait(&self, job: JobHandle) -> Result<GenerationResponse> {
        job.result.recv().map_err(|_| worker_lost())?
    }

    /// Decode the first image of a response
    pub fn decode_result(response: &GenerationResponse) -> Result<SourceImage> {
        let Some(encoded) = response.images.first() else {
            return Err(ChekiError::Decode {
                reason: "response contained zero images".to_string(),
            });
        };
        let payload = strip_data_uri(encoded);
        let bytes = BASE64.decode(payload.trim()).map_err(|e| ChekiError::Decode {
            reason: format!("invalid base64: {}", e),
        })?;
        let image = image::load_from_memory(&bytes).map_err(|e| ChekiError::Decode {
            reason: format!("not a decodable image: {}", e),
        })?;
        Ok(SourceImage::from_dynamic("generated", image))
    }

    /// Submit, poll until done, and decode the result.
    ///
    /// `on_progress` sees every sample. Cancelling `cancel` sends one
    /// interrupt, waits for the job to settle and returns `Cancelled`.
    pub fn generate<F>(
        &self,
        request: GenerationRequest,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<SourceImage>
    where
        F: FnMut(&ProgressSample),
    {
        if cancel.is_cancelled() {
            return Err(ChekiError::Cancelled);
        }

        let job = self.submit(request);
        let mut polling = true;
        let mut interrupted = false;

        loop {
            match job.result.recv_timeout(self.poll_interval) {
                Ok(_) if interrupted => return Err(ChekiError::Cancelled),
                Ok(result) => {
                    let response = result?;
                    tracing::info!(
                        job = %job.id,
                        elapsed_ms = job.elapsed().as_millis() as u64,
                        "Generation finished"
                    );
                    return Self::decode_result(&response);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(worker_lost()),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if cancel.is_cancelled() && !interrupted {
                if let Err(e) = self.cancel(&job) {
                    tracing::warn!(job = %job.id, "Interrupt request failed: {}", e);
                }
                interrupted = true;
                polling = false;
                continue;
            }

            if polling {
                let sample = match self.poll_progress(&job) {
                    Ok(sample) => sample,
                    Err(e) => {
                        // Stop the remote job before giving up on it
                        if let Err(interrupt_err) = self.cancel(&job) {
                            tracing::warn!(
                                job = %job.id,
                                "Interrupt after failed poll also failed: {}",
                                interrupt_err
                            );
                        }
                        return Err(e);
                    }
                };
                on_progress(&sample);
                if sample.is_terminal() {
                    polling = false;
                }
            }
        }
    }
}

fn worker_lost() -> ChekiError {
    ChekiError::SynthesisUnavailable {
        reason: "generation worker exited without a result".to_string(),
    }
}

fn strip_data_uri(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::encode_png;
    use image::{Rgba, RgbaImage};

    fn png_base64(w: u32, h: u32) -> String {
        BASE64.encode(encode_png(&RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255]))).unwrap())
    }

    #[test]
    fn test_decode_first_image() {
        let response = GenerationResponse {
            images: vec![png_base64(3, 5), png_base64(1, 1)],
            info: String::new(),
        };
        let image = SynthesisClient::decode_result(&response).unwrap();
        assert_eq!((image.width(), image.height()), (3, 5));
    }

    #[test]
    fn test_decode_accepts_data_uri() {
        let response = GenerationResponse {
            images: vec![format!("data:image/png;base64,{}", png_base64(2, 2))],
            info: String::new(),
        };
        assert!(SynthesisClient::decode_result(&response).is_ok());
    }

    #[test]
    fn test_decode_zero_images() {
        let err = SynthesisClient::decode_result(&GenerationResponse::default()).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_decode_garbage() {
        let response = GenerationResponse {
            images: vec!["!!!not base64!!!".to_string()],
            info: String::new(),
        };
        let err = SynthesisClient::decode_result(&response).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
