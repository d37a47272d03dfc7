//! Turns booth settings into `GenerationRequest`s
//!
//! Covers output resolution, the ControlNet catalogue, the optional face
//! detail pass and masked img2img requests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::request::{ConditioningLayer, DetailPass, GenerationRequest, InpaintSettings};
use crate::assets::{encode_png, SourceImage};
use crate::config::{GenerationDefaults, InpaintDefaults};
use crate::error::Result;

/// Long side of a full-resolution generation
pub const LONG_SIDE: u32 = 1360;
/// Short side of a full-resolution generation
pub const SHORT_SIDE: u32 = 1024;
/// Padding around the masked region when inpainting at full resolution
pub const INPAINT_PADDING: u32 = 32;

/// Which ControlNet units are switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningToggles {
    pub canny: bool,
    pub depth: bool,
    pub lineart: bool,
    pub tile: bool,
}

impl Default for ConditioningToggles {
    fn default() -> Self {
        Self {
            canny: true,
            depth: false,
            lineart: false,
            tile: true,
        }
    }
}

impl ConditioningToggles {
    pub fn none() -> Self {
        Self {
            canny: false,
            depth: false,
            lineart: false,
            tile: false,
        }
    }

    pub fn all() -> Self {
        Self {
            canny: true,
            depth: true,
            lineart: true,
            tile: true,
        }
    }

    /// Enabled modules in a fixed order
    pub fn enabled(&self) -> Vec<ConditioningModule> {
        ConditioningModule::ALL
            .into_iter()
            .filter(|m| match m {
                ConditioningModule::Canny => self.canny,
                ConditioningModule::Depth => self.depth,
                ConditioningModule::Lineart => self.lineart,
                ConditioningModule::Tile => self.tile,
            })
            .collect()
    }
}

/// The ControlNet units the booth knows how to configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditioningModule {
    Canny,
    Depth,
    Lineart,
    Tile,
}

impl ConditioningModule {
    pub const ALL: [ConditioningModule; 4] = [Self::Canny, Self::Depth, Self::Lineart, Self::Tile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canny => "canny",
            Self::Depth => "depth",
            Self::Lineart => "lineart",
            Self::Tile => "tile",
        }
    }

    /// Layer with the booth's preprocessor, model and weights
    pub fn layer(&self) -> ConditioningLayer {
        let (module, model, weight, processor_res) = match self {
            Self::Canny => ("canny", "control_canny-fp16 [e3fe7712]", 1.0, 512),
            Self::Depth => ("depth_midas", "control_depth-fp16 [400750f6]", 1.0, 512),
            Self::Lineart => (
                "lineart_standard (from white bg & black line)",
                "control_lineart-fp16 [b1c3f8d2]",
                1.0,
                512,
            ),
            Self::Tile => (
                "tile_colorfix+sharp",
                "control_v11f1e_sd15_tile [a371b31b]",
                0.7,
                2048,
            ),
        };
        ConditioningLayer {
            enabled: true,
            module: module.to_string(),
            model: model.to_string(),
            weight,
            resize_mode: "Crop and Resize".to_string(),
            processor_res,
            guidance_start: 0.0,
            guidance_end: 1.0,
            control_mode: "Balanced".to_string(),
            image: None,
        }
    }
}

/// Orientation of the generated photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Square inputs count as landscape
    pub fn of(width: u32, height: u32) -> Self {
        if height > width {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }
}

/// Submitted width and height. High-res generations are submitted at half
/// size and upscaled by the service.
pub fn output_resolution(orientation: Orientation, high_res: bool) -> (u32, u32) {
    let (w, h) = match orientation {
        Orientation::Portrait => (SHORT_SIDE, LONG_SIDE),
        Orientation::Landscape => (LONG_SIDE, SHORT_SIDE),
    };
    if high_res {
        (w / 2, h / 2)
    } else {
        (w, h)
    }
}

/// Conditioning layers for the enabled toggles, in catalogue order
pub fn conditioning_layers(toggles: &ConditioningToggles) -> Vec<ConditioningLayer> {
    toggles.enabled().iter().map(|m| m.layer()).collect()
}

/// Resize `source` to `width`x`height` and encode it as a PNG data URI
pub fn reference_data_uri(source: &SourceImage, width: u32, height: u32) -> Result<String> {
    let resized = imageops::resize(source.pixels(), width, height, FilterType::Lanczos3);
    let png = encode_png(&resized)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
}

/// Builder for text-to-image requests
#[derive(Debug, Clone)]
pub struct ConditioningConfigBuilder {
    prompt: String,
    negative_prompt: String,
    steps: u32,
    cfg_scale: f32,
    sampler_name: String,
    seed: i64,
    checkpoint: Option<String>,
    orientation: Orientation,
    high_res: bool,
    hr_scale: f32,
    hr_upscaler: String,
    denoising_strength: f32,
    toggles: ConditioningToggles,
    detail_pass: bool,
    reference: Option<SourceImage>,
}

impl ConditioningConfigBuilder {
    /// Start from configured defaults
    pub fn from_defaults(defaults: &GenerationDefaults) -> Self {
        Self {
            prompt: defaults.prompt.clone(),
            negative_prompt: defaults.negative_prompt.clone(),
            steps: defaults.steps,
            cfg_scale: defaults.cfg_scale,
            sampler_name: defaults.sampler_name.clone(),
            seed: defaults.seed,
            checkpoint: Some(defaults.checkpoint.clone()).filter(|c| !c.is_empty()),
            orientation: Orientation::Portrait,
            high_res: defaults.enable_hr,
            hr_scale: defaults.hr_scale,
            hr_upscaler: defaults.hr_upscaler.clone(),
            denoising_strength: defaults.denoising_strength,
            toggles: defaults.conditioning,
            detail_pass: defaults.detail_pass,
            reference: None,
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = negative.into();
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn high_res(mut self, enabled: bool) -> Self {
        self.high_res = enabled;
        self
    }

    pub fn toggles(mut self, toggles: ConditioningToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn detail_pass(mut self, enabled: bool) -> Self {
        self.detail_pass = enabled;
        self
    }

    pub fn checkpoint(mut self, checkpoint: Option<String>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Condition on a photo. Also picks the orientation from its shape.
    pub fn reference(mut self, source: SourceImage) -> Self {
        self.orientation = Orientation::of(source.width(), source.height());
        self.reference = Some(source);
        self
    }

    pub fn build(self) -> Result<GenerationRequest> {
        let (width, height) = output_resolution(self.orientation, self.high_res);

        let mut layers = conditioning_layers(&self.toggles);
        if let Some(reference) = &self.reference {
            let uri = reference_data_uri(reference, width, height)?;
            for layer in &mut layers {
                layer.image = Some(uri.clone());
            }
        }

        let detail_pass = self
            .detail_pass
            .then(|| DetailPass::face(self.prompt.clone()));

        tracing::debug!(
            width,
            height,
            layers = layers.len(),
            detail_pass = detail_pass.is_some(),
            "Built generation request"
        );

        Ok(GenerationRequest {
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            sampler_name: self.sampler_name,
            seed: self.seed,
            width,
            height,
            enable_hr: self.high_res,
            hr_scale: self.hr_scale,
            hr_upscaler: self.hr_upscaler,
            denoising_strength: self.denoising_strength,
            checkpoint: self.checkpoint,
            conditioning_layers: layers,
            detail_pass,
            inpaint: None,
        })
    }
}

/// Build a masked img2img request editing `image` where `mask` is white.
///
/// The submitted size is the image size rounded down to a multiple of 8.
pub fn inpaint_request(
    defaults: &InpaintDefaults,
    toggles: &ConditioningToggles,
    prompt: &str,
    negative_prompt: &str,
    image: &SourceImage,
    mask: &GrayImage,
) -> Result<GenerationRequest> {
    let mask_png = encode_png(&image::DynamicImage::ImageLuma8(mask.clone()).into_rgba8())?;
    let width = (image.width() / 8 * 8).max(8);
    let height = (image.height() / 8 * 8).max(8);

    Ok(GenerationRequest {
        prompt: prompt.to_string(),
        negative_prompt: negative_prompt.to_string(),
        steps: defaults.steps,
        cfg_scale: defaults.cfg_scale,
        sampler_name: defaults.sampler_name.clone(),
        seed: defaults.seed,
        width,
        height,
        enable_hr: false,
        hr_scale: 1.0,
        hr_upscaler: String::new(),
        denoising_strength: defaults.denoising_strength,
        checkpoint: defaults.checkpoint.clone(),
        conditioning_layers: conditioning_layers(toggles),
        detail_pass: None,
        inpaint: Some(InpaintSettings {
            init_image: image.to_base64_png()?,
            mask: BASE64.encode(mask_png),
            mask_blur: defaults.mask_blur,
            denoising_strength: defaults.denoising_strength,
            invert_mask: defaults.invert_mask,
            inpaint_full_res: true,
            inpaint_full_res_padding: INPAINT_PADDING,
            inpainting_fill: 1,
            resize_mode: 0,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_resolution_pairs() {
        assert_eq!(output_resolution(Orientation::Portrait, false), (1024, 1360));
        assert_eq!(output_resolution(Orientation::Landscape, false), (1360, 1024));
        assert_eq!(output_resolution(Orientation::Portrait, true), (512, 680));
        assert_eq!(output_resolution(Orientation::Landscape, true), (680, 512));
    }

    #[test]
    fn test_orientation_of_square_is_landscape() {
        assert_eq!(Orientation::of(10, 10), Orientation::Landscape);
        assert_eq!(Orientation::of(10, 11), Orientation::Portrait);
    }

    #[test]
    fn test_disabled_layers_are_omitted() {
        let toggles = ConditioningToggles {
            canny: false,
            depth: true,
            lineart: false,
            tile: true,
        };
        let layers = conditioning_layers(&toggles);
        let modules: Vec<_> = layers.iter().map(|l| l.module.as_str()).collect();
        assert_eq!(modules, vec!["depth_midas", "tile_colorfix+sharp"]);
        assert!(conditioning_layers(&ConditioningToggles::none()).is_empty());
    }

    #[test]
    fn test_tile_layer_catalogue() {
        let tile = ConditioningModule::Tile.layer();
        assert_eq!(tile.processor_res, 2048);
        assert!((tile.weight - 0.7).abs() < 1e-6);
        assert_eq!(tile.control_mode, "Balanced");
    }

    #[test]
    fn test_builder_from_defaults() {
        let request = ConditioningConfigBuilder::from_defaults(&GenerationDefaults::default())
            .orientation(Orientation::Landscape)
            .build()
            .unwrap();
        assert_eq!((request.width, request.height), (680, 512));
        assert_eq!(request.conditioning_layers.len(), 2);
        assert!(request.detail_pass.is_some());
        assert!(request.inpaint.is_none());
    }

    #[test]
    fn test_reference_sets_orientation_and_image() {
        let photo = SourceImage::from_dynamic(
            "photo",
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 40, Rgba([1, 2, 3, 255]))),
        );
        let request = ConditioningConfigBuilder::from_defaults(&GenerationDefaults::default())
            .high_res(false)
            .detail_pass(false)
            .reference(photo)
            .build()
            .unwrap();
        assert_eq!((request.width, request.height), (1024, 1360));
        assert!(request.detail_pass.is_none());
        assert!(request
            .conditioning_layers
            .iter()
            .all(|l| l.image.as_deref().unwrap_or("").starts_with("data:image/png;base64,")));
    }

    #[test]
    fn test_inpaint_request_rounds_size() {
        let photo = SourceImage::from_dynamic(
            "photo",
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(21, 19, Rgba([1, 2, 3, 255]))),
        );
        let mask = GrayImage::from_pixel(21, 19, Luma([255]));
        let request = inpaint_request(
            &InpaintDefaults::default(),
            &ConditioningToggles::none(),
            "hat",
            "",
            &photo,
            &mask,
        )
        .unwrap();
        assert_eq!((request.width, request.height), (16, 16));
        let inpaint = request.inpaint.unwrap();
        assert_eq!(inpaint.inpaint_full_res_padding, 32);
        assert!(request.checkpoint.is_none());
    }
}
