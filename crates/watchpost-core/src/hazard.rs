//! Color-threshold flame heuristic.
//!
//! Independent of the object detector: scans every pixel of the
//! full-resolution frame and reports a hazard when enough of them fall in
//! the red/yellow flame band. A positive result overrides the detector
//! classification entirely.

use image::RgbImage;

const FLAME_MIN_RED: u8 = 170;
const FLAME_MIN_GREEN: u8 = 80;
const FLAME_MAX_BLUE: u8 = 80;

/// Fraction of flame-colored pixels above which the frame counts as a
/// hazard (strictly greater than).
const HAZARD_PIXEL_FRACTION: f32 = 0.02;

/// Whether a single pixel falls in the flame color band.
#[inline]
pub fn is_flame_pixel(r: u8, g: u8, b: u8) -> bool {
    r > FLAME_MIN_RED && g > FLAME_MIN_GREEN && b < FLAME_MAX_BLUE && r >= g && g > b
}

/// Scan the full-resolution image for flame-colored pixels.
pub fn detect_hazard(image: &RgbImage) -> bool {
    let total = (image.width() as u64) * (image.height() as u64);
    if total == 0 {
        return false;
    }

    let flame_pixels = image
        .pixels()
        .filter(|p| is_flame_pixel(p.0[0], p.0[1], p.0[2]))
        .count() as u64;

    (flame_pixels as f32 / total as f32) > HAZARD_PIXEL_FRACTION
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 100x100 image with the first `flame_count` pixels pure red.
    fn image_with_flame_pixels(flame_count: usize) -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        for (i, pixel) in img.pixels_mut().enumerate() {
            if i < flame_count {
                *pixel = Rgb([255, 100, 0]);
            }
        }
        img
    }

    #[test]
    fn test_all_black_is_not_hazard() {
        let img = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        assert!(!detect_hazard(&img));
    }

    #[test]
    fn test_above_two_percent_is_hazard() {
        // 300 of 10000 pixels = 3%
        assert!(detect_hazard(&image_with_flame_pixels(300)));
    }

    #[test]
    fn test_exactly_two_percent_is_not_hazard() {
        // boundary is strict: 200 of 10000 pixels = exactly 2%
        assert!(!detect_hazard(&image_with_flame_pixels(200)));
    }

    #[test]
    fn test_just_above_boundary_is_hazard() {
        assert!(detect_hazard(&image_with_flame_pixels(201)));
    }

    #[test]
    fn test_pure_red_saturated_image() {
        let img = RgbImage::from_pixel(32, 32, Rgb([255, 100, 10]));
        assert!(detect_hazard(&img));
    }

    #[test]
    fn test_flame_pixel_band() {
        assert!(is_flame_pixel(255, 100, 0)); // orange flame
        assert!(is_flame_pixel(200, 190, 20)); // yellow flame
        assert!(!is_flame_pixel(255, 0, 0)); // pure red: green too low
        assert!(!is_flame_pixel(100, 90, 10)); // too dark
        assert!(!is_flame_pixel(200, 210, 10)); // green above red
        assert!(!is_flame_pixel(200, 100, 120)); // too blue
    }

    #[test]
    fn test_white_image_is_not_hazard() {
        // white fails g > b
        let img = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        assert!(!detect_hazard(&img));
    }
}
