//! Box overlay rendering.

use crate::labels;
use crate::types::DetectionResult;
use image::RgbImage;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const BOX_THICKNESS: u32 = 2;

/// Draw every detector box onto a copy of the source image.
///
/// Boxes are in model coordinates and get scaled by the result's stored
/// x/y ratios; color is the deterministic per-class hue.
pub fn render_overlay(image: &RgbImage, result: &DetectionResult) -> RgbImage {
    let mut annotated = image.clone();
    let (width, height) = annotated.dimensions();

    for b in &result.boxes {
        let x = (b.x * result.x_ratio).round() as i32;
        let y = (b.y * result.y_ratio).round() as i32;
        let w = (b.width * result.x_ratio).round().max(1.0) as u32;
        let h = (b.height * result.y_ratio).round().max(1.0) as u32;

        let color = labels::class_color(b.class_index);

        // Nested hollow rects for a visible line weight
        for inset in 0..BOX_THICKNESS as i32 {
            let rw = w.saturating_sub(2 * inset as u32);
            let rh = h.saturating_sub(2 * inset as u32);
            if rw == 0 || rh == 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(rw, rh);
            if rect.left() >= width as i32 || rect.top() >= height as i32 {
                continue;
            }
            draw_hollow_rect_mut(&mut annotated, rect, color);
        }
    }

    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use image::Rgb;

    fn black_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))
    }

    #[test]
    fn test_empty_result_leaves_image_untouched() {
        let image = black_image(64, 64);
        let result = DetectionResult {
            boxes: vec![],
            x_ratio: 1.0,
            y_ratio: 1.0,
        };
        assert_eq!(render_overlay(&image, &result), image);
    }

    #[test]
    fn test_box_border_gets_class_color() {
        let image = black_image(100, 100);
        let result = DetectionResult {
            boxes: vec![BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 40.0,
                height: 30.0,
                class_index: labels::PERSON,
                confidence: 0.9,
            }],
            x_ratio: 1.0,
            y_ratio: 1.0,
        };
        let annotated = render_overlay(&image, &result);
        let expected = labels::class_color(labels::PERSON);
        // top-left corner of the border is painted
        assert_eq!(*annotated.get_pixel(10, 10), expected);
        // interior stays black
        assert_eq!(*annotated.get_pixel(30, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_ratios_scale_boxes_to_image_space() {
        let image = black_image(200, 100);
        // model-space box at (10, 10); ratios map x2 / y0.5
        let result = DetectionResult {
            boxes: vec![BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 20.0,
                height: 20.0,
                class_index: labels::DOG,
                confidence: 0.9,
            }],
            x_ratio: 2.0,
            y_ratio: 0.5,
        };
        let annotated = render_overlay(&image, &result);
        let expected = labels::class_color(labels::DOG);
        assert_eq!(*annotated.get_pixel(20, 5), expected);
        // unscaled position must stay black
        assert_eq!(*annotated.get_pixel(10, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_partially_outside_image_does_not_panic() {
        let image = black_image(50, 50);
        let result = DetectionResult {
            boxes: vec![BoundingBox {
                x: 40.0,
                y: 40.0,
                width: 30.0,
                height: 30.0,
                class_index: 2,
                confidence: 0.5,
            }],
            x_ratio: 1.0,
            y_ratio: 1.0,
        };
        let annotated = render_overlay(&image, &result);
        assert_eq!(annotated.dimensions(), (50, 50));
    }
}
