//! Source images and branding assets
//!
//! - `SourceImage`: an immutable decoded raster with its origin
//! - `ImageSource`: where an image comes from (file, URL or in-memory bytes)
//! - `loader`: loads a whole set of sources concurrently and joins on all of them

mod loader;

pub use loader::{load_all, load_all_blocking, load_one, require_all, AssetLoader};

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, RgbaImage};
use rusttype::Font;

use crate::error::{ChekiError, Result};

/// Decoded source image. Cheap to clone; pixels are shared and never mutated.
#[derive(Debug, Clone)]
pub struct SourceImage {
    origin: String,
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    /// Wrap an already decoded image
    pub fn from_dynamic(origin: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            origin: origin.into(),
            pixels: Arc::new(image.into_rgba8()),
        }
    }

    /// Decode PNG/JPEG bytes
    pub fn decode(origin: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let origin = origin.into();
        let image = image::load_from_memory(bytes).map_err(|e| ChekiError::Load {
            origin: origin.clone(),
            reason: format!("not a decodable image: {}", e),
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ChekiError::Load {
                origin,
                reason: "image has no pixels".to_string(),
            });
        }
        Ok(Self::from_dynamic(origin, image))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_landscape(&self) -> bool {
        self.width() > self.height()
    }

    pub fn is_portrait(&self) -> bool {
        self.height() > self.width()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encode as PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.pixels)
    }

    /// Encode as bare base64 PNG, the form the WebUI accepts for `init_images`
    pub fn to_base64_png(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_png()?))
    }
}

/// Encode an RGBA buffer as PNG
pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    pixels.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Where an image is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
    Bytes { name: String, data: Vec<u8> },
}

impl ImageSource {
    /// Parse a CLI argument: http(s) URLs are fetched, anything else is a path
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    /// Human-readable description used in errors and logs
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Fixed branding assets stamped onto every print
#[derive(Clone)]
pub struct BrandingAssets {
    pub logo: SourceImage,
    /// Font for the rotated label; labels are skipped without one
    pub label_font: Option<Arc<Font<'static>>>,
}

impl BrandingAssets {
    pub fn new(logo: SourceImage) -> Self {
        Self {
            logo,
            label_font: None,
        }
    }

    pub fn with_font(mut self, font: Font<'static>) -> Self {
        self.label_font = Some(Arc::new(font));
        self
    }
}

impl std::fmt::Debug for BrandingAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrandingAssets")
            .field("logo", &self.logo.origin())
            .field("label_font", &self.label_font.is_some())
            .finish()
    }
}

/// Parse TrueType/OpenType font bytes
pub fn parse_font(origin: &str, bytes: Vec<u8>) -> Result<Font<'static>> {
    Font::try_from_vec(bytes).ok_or_else(|| ChekiError::Load {
        origin: origin.to_string(),
        reason: "not a TrueType/OpenType font".to_string(),
    })
}
