//! Raster drawing primitives used by the compositor

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use super::geometry::{Rotation, Stamp};

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Branding band colour
pub const BAND_PINK: Rgba<u8> = Rgba([238, 112, 133, 255]);

/// Return a rotated copy of `image`
pub fn rotate(image: &RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Clockwise => imageops::rotate90(image),
        Rotation::CounterClockwise => imageops::rotate270(image),
    }
}

/// Fill an axis-aligned rectangle, clipped to the canvas
pub fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
    let x_end = x.saturating_add(width).min(canvas.width());
    let y_end = y.saturating_add(height).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, color);
        }
    }
}

/// Draw `image` at its natural size with its top-left at `(x, y)`
pub fn draw_image(canvas: &mut RgbaImage, image: &RgbaImage, x: i64, y: i64) {
    imageops::overlay(canvas, image, x, y);
}

/// Filter for logos and other photographic stamps
pub const LOGO_FILTER: FilterType = FilterType::Lanczos3;
/// Filter for QR markers; keeps module edges hard
pub const MARKER_FILTER: FilterType = FilterType::Nearest;

/// Scale `image` into a square stamp with `filter` and draw it
pub fn draw_stamp(
    canvas: &mut RgbaImage,
    image: &RgbaImage,
    stamp: Stamp,
    rotation: Rotation,
    filter: FilterType,
) {
    if stamp.size == 0 {
        return;
    }
    let scaled = imageops::resize(image, stamp.size, stamp.size, filter);
    let oriented = rotate(&scaled, rotation);
    imageops::overlay(canvas, &oriented, stamp.x, stamp.y);
}

/// Render a single line of text onto a transparent buffer.
///
/// Returns `None` for text that produces no visible glyphs.
pub fn render_text(font: &Font<'static>, px: f32, color: Rgba<u8>, text: &str) -> Option<RgbaImage> {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<_> = font
        .layout(text, scale, point(0.0, v_metrics.ascent))
        .collect();

    let width = glyphs
        .iter()
        .filter_map(|g| g.pixel_bounding_box())
        .map(|bb| bb.max.x)
        .max()?;
    let height = (v_metrics.ascent - v_metrics.descent).ceil() as i32;
    if width <= 0 || height <= 0 {
        return None;
    }

    let mut buffer = RgbaImage::new(width as u32, height as u32);
    for glyph in &glyphs {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = gx as i32 + bb.min.x;
            let py = gy as i32 + bb.min.y;
            if px < 0 || py < 0 || px >= width || py >= height {
                return;
            }
            let alpha = (coverage * 255.0).round() as u8;
            if alpha == 0 {
                return;
            }
            let dst = buffer.get_pixel_mut(px as u32, py as u32);
            if alpha > dst.0[3] {
                *dst = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
            }
        });
    }
    Some(buffer)
}

/// Draw text along a vertical baseline (rotated a quarter turn clockwise)
pub fn draw_rotated_text(
    canvas: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    x: i64,
    y: i64,
    color: Rgba<u8>,
    text: &str,
) {
    if let Some(rendered) = render_text(font, px, color, text) {
        let rotated = rotate(&rendered, Rotation::Clockwise);
        imageops::overlay(canvas, &rotated, x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_pink(p: &Rgba<u8>) -> bool {
        p.0[0].abs_diff(238) <= 1 && p.0[1].abs_diff(112) <= 1 && p.0[2].abs_diff(133) <= 1
    }

    #[test]
    fn test_rotate_swaps_dimensions() {
        let img = RgbaImage::new(8, 3);
        let cw = rotate(&img, Rotation::Clockwise);
        let ccw = rotate(&img, Rotation::CounterClockwise);
        assert_eq!(cw.dimensions(), (3, 8));
        assert_eq!(ccw.dimensions(), (3, 8));
        assert_eq!(rotate(&img, Rotation::None).dimensions(), (8, 3));
    }

    #[test]
    fn test_rotation_direction() {
        let mut img = RgbaImage::from_pixel(2, 1, WHITE);
        img.put_pixel(0, 0, BAND_PINK);
        // Clockwise: the left pixel ends up on top
        let cw = rotate(&img, Rotation::Clockwise);
        assert_eq!(*cw.get_pixel(0, 0), BAND_PINK);
        // Counter-clockwise: the left pixel ends up at the bottom
        let ccw = rotate(&img, Rotation::CounterClockwise);
        assert_eq!(*ccw.get_pixel(0, 1), BAND_PINK);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut canvas = RgbaImage::from_pixel(4, 4, WHITE);
        fill_rect(&mut canvas, 2, 0, 10, 10, BAND_PINK);
        assert_eq!(*canvas.get_pixel(1, 3), WHITE);
        assert_eq!(*canvas.get_pixel(3, 3), BAND_PINK);
    }

    #[test]
    fn test_draw_image_clips_outside_canvas() {
        let mut canvas = RgbaImage::from_pixel(4, 4, WHITE);
        let img = RgbaImage::from_pixel(3, 3, BAND_PINK);
        draw_image(&mut canvas, &img, 2, 2);
        assert!(is_pink(canvas.get_pixel(3, 3)));
        assert_eq!(*canvas.get_pixel(1, 1), WHITE);
    }

    #[test]
    fn test_stamp_scales_to_size() {
        let mut canvas = RgbaImage::from_pixel(10, 10, WHITE);
        let img = RgbaImage::from_pixel(50, 50, BAND_PINK);
        draw_stamp(
            &mut canvas,
            &img,
            Stamp { x: 1, y: 1, size: 3 },
            Rotation::None,
            LOGO_FILTER,
        );
        assert!(is_pink(canvas.get_pixel(2, 2)));
        assert_eq!(*canvas.get_pixel(5, 5), WHITE);
    }

    #[test]
    fn test_marker_filter_keeps_hard_edges() {
        let black = Rgba([0, 0, 0, 255]);
        let checker = RgbaImage::from_fn(21, 21, |x, y| if (x + y) % 2 == 0 { black } else { WHITE });
        let mut canvas = RgbaImage::from_pixel(100, 100, BAND_PINK);
        draw_stamp(
            &mut canvas,
            &checker,
            Stamp { x: 0, y: 0, size: 100 },
            Rotation::None,
            MARKER_FILTER,
        );
        assert!(canvas.pixels().all(|p| *p == black || *p == WHITE));
        assert_eq!(*canvas.get_pixel(0, 0), black);
    }
}
