//! Cheki print geometry
//!
//! The print template is a 127mm x 89mm sheet holding two 46mm-wide copies of
//! the same photo side by side. Every measurement below is expressed in
//! "photo units" (the photo width is 46 units) and scaled by the actual source
//! width, so the output keeps the physical proportions at any resolution.
//!
//! ```text
//!   primary                              secondary
//!   ┌──────────────────────────────┐     ┌───────────────────────────┬────┐
//!   │    ┌──────┐      ┌──────┐    │     │ ┌──────┐      ┌──────┐    │    │
//!   │    │ img  │      │ img  │    │     │ │ img  │      │ img  │    │band│
//!   │    └──────┘      └──────┘    │     │ └──────┘      └──────┘    │    │
//!   │    logo   qr     logo   qr   │     │ logo   qr     logo   qr   │    │
//!   └──────────────────────────────┘     └───────────────────────────┴────┘
//! ```
//!
//! All functions here are pure: identical `(iw, ih, variant)` always yields the
//! identical layout.

use serde::{Deserialize, Serialize};

/// Photo width in template units.
pub const PHOTO_UNITS: f64 = 46.0;
/// Sheet width in template units.
pub const SHEET_UNITS: f64 = 127.0;
/// Sheet height factor: 89mm over a 184mm reference (3-panel split), times 3.
pub const SHEET_HEIGHT_RATIO: f64 = 89.0 * 3.0 / 184.0;
/// Branding band width in sheet units.
pub const BAND_UNITS: f64 = 19.0;

const PASTE_Y_UNITS: f64 = 7.0;
const BOTTOM_MARGIN_UNITS: f64 = 4.0;
const LOGO_SIZE_UNITS: f64 = 15.0;
const LOGO_LIFT_UNITS: f64 = 12.5;
const QR_SIZE_UNITS: f64 = 10.0;

/// Which of the two printed variants is being laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The "real" photo print
    Primary,
    /// The "AI" print with the branding band
    Secondary,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Label used in stored file names
    pub fn file_label(&self) -> &'static str {
        match self {
            Self::Primary => "Real",
            Self::Secondary => "Ai",
        }
    }

    fn template(&self) -> &'static Template {
        match self {
            Self::Primary => &PRIMARY_TEMPLATE,
            Self::Secondary => &SECONDARY_TEMPLATE,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quarter-turn applied to an image before it is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    None,
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    /// Dimensions after applying this rotation
    pub fn apply_dims(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::None => (width, height),
            Self::Clockwise | Self::CounterClockwise => (height, width),
        }
    }

    pub fn inverse(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }
}

/// Horizontal placements per variant, in photo units.
struct Template {
    paste_x: [f64; 2],
    logo_x: [f64; 2],
    qr_x: [f64; 2],
}

// The primary sheet centres the pair; the secondary sheet shifts it left to
// make room for the band. Logos sit half a unit left of each photo, QR codes
// are right-aligned half a unit inside it.
const PRIMARY_TEMPLATE: Template = Template {
    paste_x: [21.5, 75.5],
    logo_x: [21.0, 75.0],
    qr_x: [57.0, 111.0],
};

const SECONDARY_TEMPLATE: Template = Template {
    paste_x: [4.0, 58.0],
    logo_x: [3.5, 57.5],
    qr_x: [39.5, 93.5],
};

/// A square stamp (logo or QR code) placed on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

/// Complete layout for one variant of one source image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChekiGeometry {
    pub variant: Variant,
    /// Source dimensions the layout was computed for
    pub source_width: u32,
    pub source_height: u32,
    pub out_width: u32,
    pub out_height: u32,
    /// Width of the branding band; only painted on the secondary variant
    pub band_width: u32,
    pub paste_x1: i64,
    pub paste_x2: i64,
    pub paste_y: i64,
    pub logos: [Stamp; 2],
    pub qr_codes: [Stamp; 2],
    /// Top-left of the rotated label, inside the band
    pub label_x: i64,
    pub label_y: i64,
    /// Label glyph height in pixels (before rotation)
    pub label_px: u32,
}

impl ChekiGeometry {
    /// Compute the layout for a source of `iw` x `ih` pixels.
    ///
    /// Callers guarantee `iw, ih > 0`.
    pub fn compute(iw: u32, ih: u32, variant: Variant) -> Self {
        let w = iw as f64;
        let h = ih as f64;
        let unit = |units: f64| w * units / PHOTO_UNITS;
        let template = variant.template();

        let out_width = round_u32(w * SHEET_UNITS / PHOTO_UNITS);
        let out_height = round_u32(h * SHEET_HEIGHT_RATIO);
        let band_width = round_u32(out_width as f64 * BAND_UNITS / SHEET_UNITS);

        let paste_y = round_i64(h * PASTE_Y_UNITS / PHOTO_UNITS);

        let logo_size = round_u32(unit(LOGO_SIZE_UNITS));
        let logo_y = round_i64(out_height as f64 - unit(BOTTOM_MARGIN_UNITS) - unit(LOGO_LIFT_UNITS));
        let logos = template.logo_x.map(|x| Stamp {
            x: round_i64(unit(x)),
            y: logo_y,
            size: logo_size,
        });

        let qr_size = round_u32(unit(QR_SIZE_UNITS));
        let qr_y = round_i64(out_height as f64 - unit(BOTTOM_MARGIN_UNITS) - qr_size as f64);
        let qr_codes = template.qr_x.map(|x| Stamp {
            x: round_i64(unit(x)),
            y: qr_y,
            size: qr_size,
        });

        let band_left = out_width as i64 - band_width as i64;

        Self {
            variant,
            source_width: iw,
            source_height: ih,
            out_width,
            out_height,
            band_width,
            paste_x1: round_i64(unit(template.paste_x[0])),
            paste_x2: round_i64(unit(template.paste_x[1])),
            paste_y,
            logos,
            qr_codes,
            label_x: band_left + round_i64(band_width as f64 / 4.0),
            label_y: paste_y,
            label_px: round_u32(band_width as f64 / 2.0).max(1),
        }
    }

    /// Whether the branding band is painted for this variant
    pub fn has_band(&self) -> bool {
        self.variant == Variant::Secondary
    }

    /// Both paste positions as `(x, y)` pairs
    pub fn paste_positions(&self) -> [(i64, i64); 2] {
        [(self.paste_x1, self.paste_y), (self.paste_x2, self.paste_y)]
    }
}

/// True when the source must be turned upright before compositing
pub fn is_landscape(iw: u32, ih: u32) -> bool {
    iw > ih
}

/// Rotation applied to the source before it is drawn.
///
/// Landscape sources are turned clockwise for the primary variant and
/// counter-clockwise for the secondary one; portrait and square sources are
/// drawn as-is.
pub fn source_rotation(iw: u32, ih: u32, variant: Variant) -> Rotation {
    if !is_landscape(iw, ih) {
        return Rotation::None;
    }
    match variant {
        Variant::Primary => Rotation::Clockwise,
        Variant::Secondary => Rotation::CounterClockwise,
    }
}

/// Rotation applied to logo stamps so they read upright alongside the turned
/// photo once the print is turned back to landscape.
pub fn logo_rotation(iw: u32, ih: u32, variant: Variant) -> Rotation {
    source_rotation(iw, ih, variant)
}

/// Layout for a source as it will actually be drawn (after any rotation)
pub fn layout_for_source(iw: u32, ih: u32, variant: Variant) -> (Rotation, ChekiGeometry) {
    let rotation = source_rotation(iw, ih, variant);
    let (w, h) = rotation.apply_dims(iw, ih);
    (rotation, ChekiGeometry::compute(w, h, variant))
}

fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

fn round_i64(value: f64) -> i64 {
    value.round() as i64
}
