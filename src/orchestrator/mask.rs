//! Binary edit masks

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};

use crate::assets::SourceImage;

pub const MASK_ON: Luma<u8> = Luma([255]);
pub const MASK_OFF: Luma<u8> = Luma([0]);

/// Build a mask from a painted overlay: any non-transparent pixel is repainted
pub fn from_painted(painted: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(painted.width(), painted.height(), |x, y| {
        if painted.get_pixel(x, y).0[3] > 0 {
            MASK_ON
        } else {
            MASK_OFF
        }
    })
}

/// Build a mask from a loaded image. Images with transparency are read as
/// painted overlays, opaque ones by brightness.
pub fn from_source(source: &SourceImage) -> GrayImage {
    let pixels = source.pixels();
    if pixels.pixels().any(|p| p.0[3] < 255) {
        return from_painted(pixels);
    }
    GrayImage::from_fn(pixels.width(), pixels.height(), |x, y| {
        let [r, g, b, _] = pixels.get_pixel(x, y).0;
        let luma = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        if luma > 127 {
            MASK_ON
        } else {
            MASK_OFF
        }
    })
}

/// Swap repainted and kept regions
pub fn invert(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] > 127 {
            MASK_OFF
        } else {
            MASK_ON
        }
    })
}

/// Number of pixels marked for repainting
pub fn coverage(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 127).count()
}

/// Scale a mask to `width`x`height`, keeping it binary
pub fn fit(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_painted_alpha_becomes_white() {
        let mut painted = RgbaImage::new(3, 1);
        painted.put_pixel(1, 0, Rgba([255, 0, 0, 10]));
        let mask = from_painted(&painted);
        assert_eq!(mask.get_pixel(0, 0), &MASK_OFF);
        assert_eq!(mask.get_pixel(1, 0), &MASK_ON);
        assert_eq!(coverage(&mask), 1);
    }

    #[test]
    fn test_invert() {
        let mask = GrayImage::from_pixel(2, 2, MASK_ON);
        assert_eq!(coverage(&invert(&mask)), 0);
    }

    #[test]
    fn test_fit_keeps_binary() {
        let mut mask = GrayImage::from_pixel(4, 4, MASK_OFF);
        mask.put_pixel(0, 0, MASK_ON);
        let fitted = fit(&mask, 8, 8);
        assert_eq!(fitted.dimensions(), (8, 8));
        assert!(fitted.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(coverage(&fitted) > 0);
    }
}
