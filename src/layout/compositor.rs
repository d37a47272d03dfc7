//! Layout compositor
//!
//! Renders the two print variants from a role assignment and the branding
//! assets. Both canvases are built privately and only returned together, so a
//! failure never exposes a half-drawn result. Rendering is deterministic: the
//! same inputs always produce byte-identical buffers.

use image::RgbaImage;
use sha2::{Digest, Sha256};

use super::draw::{self, BAND_PINK, WHITE};
use super::geometry::{layout_for_source, logo_rotation, ChekiGeometry, Rotation, Variant};
use super::roles::RoleAssignment;
use crate::assets::{encode_png, BrandingAssets, SourceImage};
use crate::error::{ChekiError, Result};

/// Largest canvas side we are willing to allocate. A source whose print
/// would exceed it is rejected as a load error for that source.
pub const MAX_CANVAS_SIDE: u32 = 20_000;

/// Optional per-print annotations
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Text drawn along the band of the secondary variant (e.g. an order number)
    pub label: Option<String>,
}

impl RenderOptions {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

/// The two rendered print variants
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    primary: RgbaImage,
    secondary: RgbaImage,
}

/// PNG-encoded composites, ready to hand to a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedComposite {
    pub primary_png: Vec<u8>,
    pub secondary_png: Vec<u8>,
}

impl CompositeResult {
    pub fn primary(&self) -> &RgbaImage {
        &self.primary
    }

    pub fn secondary(&self) -> &RgbaImage {
        &self.secondary
    }

    pub fn variant(&self, variant: Variant) -> &RgbaImage {
        match variant {
            Variant::Primary => &self.primary,
            Variant::Secondary => &self.secondary,
        }
    }

    /// Encode both variants as PNG
    pub fn encode(&self) -> Result<EncodedComposite> {
        Ok(EncodedComposite {
            primary_png: encode_png(&self.primary)?,
            secondary_png: encode_png(&self.secondary)?,
        })
    }

    /// SHA-256 over both buffers (dimensions included), hex encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for buffer in [&self.primary, &self.secondary] {
            hasher.update(buffer.width().to_le_bytes());
            hasher.update(buffer.height().to_le_bytes());
            hasher.update(buffer.as_raw());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Source pixels as they will be drawn, plus the layout computed for them
#[derive(Debug, Clone)]
pub struct PreparedSource {
    pub rotation: Rotation,
    pub pixels: RgbaImage,
    pub geometry: ChekiGeometry,
}

/// Turn the source upright for `variant` and compute its layout
pub fn prepare_source(source: &SourceImage, variant: Variant) -> Result<PreparedSource> {
    if source.width() == 0 || source.height() == 0 {
        return Err(ChekiError::Render {
            reason: format!("{} has no pixels", source.origin()),
        });
    }
    let (rotation, geometry) = layout_for_source(source.width(), source.height(), variant);
    if geometry.out_width > MAX_CANVAS_SIDE || geometry.out_height > MAX_CANVAS_SIDE {
        return Err(ChekiError::Load {
            origin: source.origin().to_string(),
            reason: format!(
                "{}x{} is too large to print: it needs a {}x{} canvas (limit {} per side)",
                source.width(),
                source.height(),
                geometry.out_width,
                geometry.out_height,
                MAX_CANVAS_SIDE
            ),
        });
    }
    Ok(PreparedSource {
        rotation,
        pixels: draw::rotate(source.pixels(), rotation),
        geometry,
    })
}

/// Renders print variants with a fixed set of branding assets
pub struct Compositor<'a> {
    branding: &'a BrandingAssets,
}

impl<'a> Compositor<'a> {
    pub fn new(branding: &'a BrandingAssets) -> Self {
        Self { branding }
    }

    /// Render both variants
    pub fn render(&self, roles: &RoleAssignment, options: &RenderOptions) -> Result<CompositeResult> {
        let primary = self.render_variant(&roles.primary, Variant::Primary, &roles.marker, options)?;
        let secondary =
            self.render_variant(&roles.secondary, Variant::Secondary, &roles.marker, options)?;
        tracing::info!(
            primary = %format!("{}x{}", primary.width(), primary.height()),
            secondary = %format!("{}x{}", secondary.width(), secondary.height()),
            "Rendered cheki composites"
        );
        Ok(CompositeResult { primary, secondary })
    }

    /// Render one variant onto a fresh canvas
    pub fn render_variant(
        &self,
        source: &SourceImage,
        variant: Variant,
        marker: &SourceImage,
        options: &RenderOptions,
    ) -> Result<RgbaImage> {
        let prepared = prepare_source(source, variant)?;
        let g = &prepared.geometry;

        let mut canvas = RgbaImage::from_pixel(g.out_width, g.out_height, WHITE);

        if g.has_band() {
            let band_left = g.out_width - g.band_width;
            draw::fill_rect(&mut canvas, band_left, 0, g.band_width, g.out_height, BAND_PINK);
        }

        for (x, y) in g.paste_positions() {
            draw::draw_image(&mut canvas, &prepared.pixels, x, y);
        }

        let logo_turn = logo_rotation(source.width(), source.height(), variant);
        for stamp in g.logos {
            draw::draw_stamp(
                &mut canvas,
                self.branding.logo.pixels(),
                stamp,
                logo_turn,
                draw::LOGO_FILTER,
            );
        }

        if variant == Variant::Secondary {
            // QR codes scan in any orientation
            for stamp in g.qr_codes {
                draw::draw_stamp(
                    &mut canvas,
                    marker.pixels(),
                    stamp,
                    Rotation::None,
                    draw::MARKER_FILTER,
                );
            }
            self.draw_label(&mut canvas, g, options);
        }

        Ok(canvas)
    }

    fn draw_label(&self, canvas: &mut RgbaImage, g: &ChekiGeometry, options: &RenderOptions) {
        let Some(label) = options.label.as_deref().filter(|l| !l.trim().is_empty()) else {
            return;
        };
        match &self.branding.label_font {
            Some(font) => draw::draw_rotated_text(
                canvas,
                font,
                g.label_px as f32,
                g.label_x,
                g.label_y,
                WHITE,
                label,
            ),
            None => tracing::warn!("No label font configured, skipping label {:?}", label),
        }
    }
}

/// Assign roles and render both variants in one call
pub fn compose(
    images: Vec<SourceImage>,
    branding: &BrandingAssets,
    options: &RenderOptions,
) -> Result<CompositeResult> {
    let roles = RoleAssignment::assign(images)?;
    Compositor::new(branding).render(&roles, options)
}
