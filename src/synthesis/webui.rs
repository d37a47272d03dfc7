//! Stable Diffusion WebUI client
//!
//! Blocking HTTP client for the `/sdapi/v1` API. Configured from
//! `PipelineConfig` (and therefore from `CHEKI_SD_URL` /
//! `CHEKI_SD_TIMEOUT_MS`).

use std::time::Duration;

use serde::Deserialize;

use super::request::GenerationRequest;
use super::service::{GenerationResponse, ProgressSample, SynthesisService};
use crate::config::PipelineConfig;
use crate::error::{ChekiError, Result};
use crate::session::Session;

/// Progress polls are short; they must never hold up the poll loop
const PROGRESS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ProgressWire {
    #[serde(default)]
    progress: f32,
    #[serde(default)]
    eta_relative: f32,
    #[serde(default)]
    state: ProgressStateWire,
    #[serde(default)]
    textinfo: Option<String>,
    #[serde(default)]
    current_image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProgressStateWire {
    #[serde(default)]
    interrupted: bool,
}

impl From<ProgressWire> for ProgressSample {
    fn from(wire: ProgressWire) -> Self {
        Self {
            fraction: wire.progress.clamp(0.0, 1.0),
            eta_relative: wire.eta_relative,
            status_text: wire.textinfo.unwrap_or_default(),
            preview_image: wire.current_image.filter(|s| !s.is_empty()),
            interrupted: wire.state.interrupted,
        }
    }
}

/// Client for a running WebUI instance
#[derive(Debug, Clone)]
pub struct WebUiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    timeout_ms: u64,
    authorization: Option<String>,
}

impl WebUiClient {
    pub fn new(config: &PipelineConfig, session: &Session) -> Result<Self> {
        Self::with_base_url(config.api_base(), config.timeout_ms, session)
    }

    pub fn with_base_url(base_url: &str, timeout_ms: u64, session: &Session) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ChekiError::SynthesisUnavailable {
                reason: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            authorization: session.authorization(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.authorization {
            Some(auth) => request.header(reqwest::header::AUTHORIZATION, auth),
            None => request,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ChekiError {
        if e.is_timeout() {
            ChekiError::SynthesisTimeout {
                timeout_ms: self.timeout_ms,
            }
        } else if e.is_connect() {
            ChekiError::SynthesisUnavailable {
                reason: format!("Cannot connect to WebUI at {}: {}", self.base_url, e),
            }
        } else {
            ChekiError::synthesis(e.status().map(|s| s.as_u16()), e.to_string())
        }
    }

    /// Map a non-success response into an error carrying status and body
    fn check_status(&self, response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ChekiError::synthesis(Some(status.as_u16()), body))
    }
}

impl SynthesisService for WebUiClient {
    fn name(&self) -> &str {
        "webui"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let endpoint = request.endpoint();
        tracing::info!(
            url = %self.url(endpoint.path()),
            width = request.width,
            height = request.height,
            "Submitting generation request"
        );

        let response = self
            .authorize(self.http.post(self.url(endpoint.path())))
            .json(&request.to_payload())
            .send()
            .map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response)?;
        let status = response.status().as_u16();

        let parsed: GenerationResponse = response.json().map_err(|e| {
            ChekiError::synthesis(Some(status), format!("Invalid response from WebUI: {}", e))
        })?;
        if parsed.images.is_empty() {
            return Err(ChekiError::synthesis(
                Some(status),
                "response contained no images",
            ));
        }
        Ok(parsed)
    }

    fn progress(&self) -> Result<ProgressSample> {
        let response = self
            .authorize(
                self.http
                    .get(self.url("/sdapi/v1/progress"))
                    .query(&[("skip_current_image", "false")])
                    .timeout(PROGRESS_TIMEOUT),
            )
            .send()
            .map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response)?;
        let wire: ProgressWire = response.json().map_err(|e| ChekiError::Synthesis {
            status: None,
            message: format!("Invalid progress response: {}", e),
        })?;
        Ok(wire.into())
    }

    fn interrupt(&self) -> Result<()> {
        tracing::info!(url = %self.base_url, "Interrupting generation");
        let response = self
            .authorize(self.http.post(self.url("/sdapi/v1/interrupt")))
            .send()
            .map_err(|e| self.transport_error(e))?;
        self.check_status(response)?;
        Ok(())
    }
}
