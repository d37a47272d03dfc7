//! Pipeline configuration
//!
//! Defaults match the production booth setup. A JSON file can replace any
//! subset of fields, and `CHEKI_*` environment variables override both.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChekiError, Result};
use crate::synthesis::ConditioningToggles;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:7860";
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;

pub const DEFAULT_PROMPT: &str = "smile, anime-style, 8k, RAW photo, best quality, masterpiece, anime, clear, best quality, ultra high res";
pub const DEFAULT_NEGATIVE_PROMPT: &str = "EasyNegative, deformed mutated disfigured, missing arms, 4 fingers, 6 fingers, extra_arms, mutated hands, bad anatomy, disconnected limbs, low quality, worst quality, out of focus, ugly, error, blurry, bokeh, Shoulder bag, bag, multiple arms, nsfw";
pub const DEFAULT_CHECKPOINT: &str = "flat2DAnimerge_v45Sharp [fe95063ba6]";

/// Top-level configuration for one pipeline deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the WebUI (without `/sdapi/v1`)
    pub api_url: String,
    /// Timeout for a single generation request
    pub timeout_ms: u64,
    /// Interval between progress polls
    pub poll_interval_ms: u64,
    /// Where composites and generated images are stored
    pub output_dir: PathBuf,
    /// Branding logo stamped on the composites
    pub logo_path: Option<PathBuf>,
    /// TrueType font used for the rotated label
    pub font_path: Option<PathBuf>,
    /// txt2img defaults
    pub defaults: GenerationDefaults,
    /// img2img defaults for mask chains
    pub inpaint: InpaintDefaults,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            output_dir: PathBuf::from("output"),
            logo_path: None,
            font_path: None,
            defaults: GenerationDefaults::default(),
            inpaint: InpaintDefaults::default(),
        }
    }
}

/// Generation parameters used when the caller does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub seed: i64,
    pub checkpoint: String,
    pub enable_hr: bool,
    pub hr_scale: f32,
    pub hr_upscaler: String,
    pub denoising_strength: f32,
    pub conditioning: ConditioningToggles,
    pub detail_pass: bool,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            steps: 20,
            cfg_scale: 7.0,
            sampler_name: "DPM++ 2M Karras".to_string(),
            seed: -1,
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            enable_hr: true,
            hr_scale: 2.0,
            hr_upscaler: "4x-UltraSharp".to_string(),
            denoising_strength: 0.7,
            conditioning: ConditioningToggles::default(),
            detail_pass: true,
        }
    }
}

/// Masked-edit parameters shared by every step of a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintDefaults {
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub seed: i64,
    pub denoising_strength: f32,
    pub mask_blur: u32,
    pub invert_mask: bool,
    /// `None` keeps whatever checkpoint the WebUI has loaded
    pub checkpoint: Option<String>,
}

impl Default for InpaintDefaults {
    fn default() -> Self {
        Self {
            steps: 30,
            cfg_scale: 7.0,
            sampler_name: "Euler a".to_string(),
            seed: -1,
            denoising_strength: 0.5,
            mask_blur: 4,
            invert_mask: false,
            checkpoint: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ChekiError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ChekiError::Config {
            reason: format!("invalid JSON in {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHEKI_*` environment variables on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("CHEKI_SD_URL") {
            self.api_url = url;
        }
        self.timeout_ms = env_u64("CHEKI_SD_TIMEOUT_MS", self.timeout_ms);
        self.poll_interval_ms = env_u64("CHEKI_POLL_INTERVAL_MS", self.poll_interval_ms);
        if let Ok(dir) = env::var("CHEKI_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("CHEKI_LOGO_PATH") {
            self.logo_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = env::var("CHEKI_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Reject values the WebUI or the poll loop cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(ChekiError::Config {
                reason: "api_url must not be empty".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ChekiError::Config {
                reason: "poll_interval_ms must be positive".to_string(),
            });
        }
        if self.defaults.steps == 0 || self.inpaint.steps == 0 {
            return Err(ChekiError::Config {
                reason: "step count must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.inpaint.denoising_strength) {
            return Err(ChekiError::Config {
                reason: format!(
                    "inpaint denoising_strength {} outside 0.0..=1.0",
                    self.inpaint.denoising_strength
                ),
            });
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}

fn env_u64(key: &str, current: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring {}={:?}: not a number", key, raw);
                current
            }
        },
        Err(_) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_ms, 300);
        assert!(config.defaults.enable_hr);
        assert_eq!(config.inpaint.mask_blur, 4);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"api_url": "http://gpu-box:7860/", "defaults": {{"steps": 28}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.api_base(), "http://gpu-box:7860");
        assert_eq!(config.defaults.steps, 28);
        assert_eq!(config.defaults.sampler_name, "DPM++ 2M Karras");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = PipelineConfig {
            poll_interval_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
