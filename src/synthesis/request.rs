//! Generation request types and their WebUI wire format
//!
//! A `GenerationRequest` is immutable once built. `to_payload` renders it in
//! the JSON shape the `/sdapi/v1/txt2img` and `/sdapi/v1/img2img` endpoints
//! accept.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Which WebUI endpoint a request is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Txt2Img,
    Img2Img,
}

impl Endpoint {
    /// Path below the WebUI base URL
    pub fn path(&self) -> &'static str {
        match self {
            Self::Txt2Img => "/sdapi/v1/txt2img",
            Self::Img2Img => "/sdapi/v1/img2img",
        }
    }
}

/// One ControlNet unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditioningLayer {
    pub enabled: bool,
    pub module: String,
    pub model: String,
    pub weight: f32,
    pub resize_mode: String,
    pub processor_res: u32,
    pub guidance_start: f32,
    pub guidance_end: f32,
    pub control_mode: String,
    /// Reference image as a `data:` URI; the WebUI falls back to the init image without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Face-region re-generation pass (ADetailer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPass {
    #[serde(rename = "ad_model")]
    pub model: String,
    #[serde(rename = "ad_prompt")]
    pub prompt: String,
    #[serde(rename = "ad_negative_prompt")]
    pub negative_prompt: String,
    #[serde(rename = "ad_confidence")]
    pub confidence: f32,
    #[serde(rename = "ad_mask_min_ratio")]
    pub mask_min_ratio: f32,
    #[serde(rename = "ad_mask_max_ratio")]
    pub mask_max_ratio: f32,
    #[serde(rename = "ad_mask_blur")]
    pub mask_blur: u32,
    #[serde(rename = "ad_denoising_strength")]
    pub denoising_strength: f32,
    #[serde(rename = "ad_inpaint_only_masked")]
    pub inpaint_only_masked: bool,
    #[serde(rename = "ad_use_inpaint_width_height")]
    pub use_inpaint_width_height: bool,
    #[serde(rename = "ad_restore_face")]
    pub restore_face: bool,
}

impl DetailPass {
    /// Face detailer used by the booth
    pub fn face(prompt: impl Into<String>) -> Self {
        Self {
            model: "face_yolov8n.pt".to_string(),
            prompt: prompt.into(),
            negative_prompt: "ugly, deformed".to_string(),
            confidence: 0.3,
            mask_min_ratio: 0.0,
            mask_max_ratio: 1.0,
            mask_blur: 8,
            denoising_strength: 0.4,
            inpaint_only_masked: true,
            use_inpaint_width_height: false,
            restore_face: false,
        }
    }
}

/// Masked img2img parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InpaintSettings {
    /// Base64 PNG the edit starts from
    pub init_image: String,
    /// Base64 PNG mask, white = repaint
    pub mask: String,
    pub mask_blur: u32,
    pub denoising_strength: f32,
    pub invert_mask: bool,
    pub inpaint_full_res: bool,
    pub inpaint_full_res_padding: u32,
    /// 0 fill, 1 original, 2 latent noise, 3 latent nothing
    pub inpainting_fill: u8,
    pub resize_mode: u8,
}

/// A complete request for the synthesis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub seed: i64,
    /// Width as submitted (already halved when high-res is on)
    pub width: u32,
    pub height: u32,
    pub enable_hr: bool,
    pub hr_scale: f32,
    pub hr_upscaler: String,
    pub denoising_strength: f32,
    /// `None` keeps the WebUI's loaded checkpoint
    pub checkpoint: Option<String>,
    pub conditioning_layers: Vec<ConditioningLayer>,
    pub detail_pass: Option<DetailPass>,
    pub inpaint: Option<InpaintSettings>,
}

impl GenerationRequest {
    pub fn endpoint(&self) -> Endpoint {
        if self.inpaint.is_some() {
            Endpoint::Img2Img
        } else {
            Endpoint::Txt2Img
        }
    }

    /// Output size the service will produce, after any high-res upscale
    pub fn final_size(&self) -> (u32, u32) {
        if self.enable_hr {
            (
                (self.width as f32 * self.hr_scale).round() as u32,
                (self.height as f32 * self.hr_scale).round() as u32,
            )
        } else {
            (self.width, self.height)
        }
    }

    /// Render the WebUI JSON body
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("prompt".into(), json!(self.prompt));
        payload.insert("negative_prompt".into(), json!(self.negative_prompt));
        payload.insert("steps".into(), json!(self.steps));
        payload.insert("cfg_scale".into(), json!(self.cfg_scale));
        payload.insert("sampler_name".into(), json!(self.sampler_name));
        payload.insert("seed".into(), json!(self.seed));
        payload.insert("width".into(), json!(self.width));
        payload.insert("height".into(), json!(self.height));
        payload.insert("denoising_strength".into(), json!(self.denoising_strength));

        match &self.inpaint {
            None => {
                payload.insert("enable_hr".into(), json!(self.enable_hr));
                payload.insert("hr_scale".into(), json!(self.hr_scale));
                payload.insert("hr_upscaler".into(), json!(self.hr_upscaler));
            }
            Some(inpaint) => {
                payload.insert("init_images".into(), json!([inpaint.init_image]));
                payload.insert("mask".into(), json!(inpaint.mask));
                payload.insert("mask_blur".into(), json!(inpaint.mask_blur));
                payload.insert(
                    "inpainting_mask_invert".into(),
                    json!(u8::from(inpaint.invert_mask)),
                );
                payload.insert("inpaint_full_res".into(), json!(inpaint.inpaint_full_res));
                payload.insert(
                    "inpaint_full_res_padding".into(),
                    json!(inpaint.inpaint_full_res_padding),
                );
                payload.insert("inpainting_fill".into(), json!(inpaint.inpainting_fill));
                payload.insert("resize_mode".into(), json!(inpaint.resize_mode));
                payload.insert("denoising_strength".into(), json!(inpaint.denoising_strength));
            }
        }

        if let Some(checkpoint) = &self.checkpoint {
            payload.insert(
                "override_settings".into(),
                json!({ "sd_model_checkpoint": checkpoint }),
            );
        }

        let mut scripts = Map::new();
        if !self.conditioning_layers.is_empty() {
            scripts.insert(
                "controlnet".into(),
                json!({ "args": self.conditioning_layers }),
            );
        }
        if let Some(detail) = &self.detail_pass {
            scripts.insert("adetailer".into(), json!({ "args": [detail] }));
        }
        if !scripts.is_empty() {
            payload.insert("alwayson_scripts".into(), Value::Object(scripts));
        }

        Value::Object(payload)
    }
}
