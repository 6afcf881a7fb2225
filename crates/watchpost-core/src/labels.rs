//! Fixed 80-class COCO vocabulary and per-class overlay colors.

use image::Rgb;

/// COCO class names in detector output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub const PERSON: usize = 0;
pub const CAT: usize = 15;
pub const DOG: usize = 16;

/// Class name for an index, `None` when out of vocabulary.
pub fn class_name(index: usize) -> Option<&'static str> {
    COCO_CLASSES.get(index).copied()
}

/// Deterministic per-class color: hue rotates by 37° per class index,
/// at 90% saturation and 50% lightness.
pub fn class_color(index: usize) -> Rgb<u8> {
    let hue = ((index * 37) % 360) as f32;
    hsl_to_rgb(hue, 0.9, 0.5)
}

/// Convert HSL (h in degrees, s/l in [0, 1]) to 8-bit RGB.
fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Rgb<u8> {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    Rgb([
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_size() {
        assert_eq!(COCO_CLASSES.len(), 80);
    }

    #[test]
    fn test_category_class_indices() {
        assert_eq!(COCO_CLASSES[PERSON], "person");
        assert_eq!(COCO_CLASSES[CAT], "cat");
        assert_eq!(COCO_CLASSES[DOG], "dog");
    }

    #[test]
    fn test_class_name_out_of_range() {
        assert_eq!(class_name(79), Some("toothbrush"));
        assert_eq!(class_name(80), None);
    }

    #[test]
    fn test_class_color_deterministic() {
        assert_eq!(class_color(16), class_color(16));
    }

    #[test]
    fn test_class_color_person_is_red_dominant() {
        // hue 0 at 90%/50% → strongly red
        let Rgb([r, g, b]) = class_color(PERSON);
        assert!(r > 200);
        assert!(g < 40);
        assert!(b < 40);
    }

    #[test]
    fn test_adjacent_classes_get_distinct_colors() {
        // 37° per step keeps neighboring classes visually apart
        assert_ne!(class_color(0), class_color(1));
        assert_ne!(class_color(1), class_color(2));
    }

    #[test]
    fn test_hsl_to_rgb_extremes() {
        assert_eq!(hsl_to_rgb(0.0, 0.0, 0.0), Rgb([0, 0, 0]));
        assert_eq!(hsl_to_rgb(0.0, 0.0, 1.0), Rgb([255, 255, 255]));
        // pure green
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_hue_wraps_within_360() {
        // class 10 → hue 370 % 360 = 10, same as a direct 10° conversion
        assert_eq!(class_color(10), hsl_to_rgb(10.0, 0.9, 0.5));
    }
}
