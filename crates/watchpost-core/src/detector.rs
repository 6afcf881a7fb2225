//! YOLO-family object detector via ONNX Runtime.
//!
//! Consumes a pretrained single-head YOLO export over the fixed 80-class
//! COCO vocabulary: `[1, 3, 640, 640]` input, `[1, 84, N]` output
//! (4 box attributes + 80 class scores per candidate), decoded with
//! confidence filtering and per-class NMS.

use crate::labels;
use crate::types::{BoundingBox, DetectionResult};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const YOLO_INPUT_SIZE: usize = 640;
const YOLO_BOX_ATTRS: usize = 4;
const YOLO_NUM_CLASSES: usize = labels::COCO_CLASSES.len();
const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — export a YOLO ONNX model and place it in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// YOLO-based object detector over the COCO vocabulary.
pub struct ObjectDetector {
    session: Session,
}

impl ObjectDetector {
    /// Load the detector ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded object detection model"
        );

        Ok(Self { session })
    }

    /// Detect objects in an RGB image.
    ///
    /// Boxes come back in model input coordinates together with the
    /// per-axis ratios needed to map them onto the source image.
    pub fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult, DetectorError> {
        let (width, height) = image.dimensions();
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detector output: {e}")))?;

        let candidates = decode_predictions(data, YOLO_CONFIDENCE_THRESHOLD)?;
        let boxes = nms(candidates, YOLO_NMS_THRESHOLD);

        Ok(DetectionResult {
            boxes,
            x_ratio: width as f32 / YOLO_INPUT_SIZE as f32,
            y_ratio: height as f32 / YOLO_INPUT_SIZE as f32,
        })
    }
}

/// Resize (stretch) to the model input square and normalize to a NCHW
/// float tensor in [0, 1].
///
/// The stretch is deliberate: the per-axis ratios in the result undo it,
/// so no letterbox padding bookkeeping is needed downstream.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let size = YOLO_INPUT_SIZE as u32;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y as usize, x as usize]] = r as f32 / 255.0;
        tensor[[0, 1, y as usize, x as usize]] = g as f32 / 255.0;
        tensor[[0, 2, y as usize, x as usize]] = b as f32 / 255.0;
    }
    tensor
}

/// Decode a flat `[1, 84, N]` YOLO head into candidate boxes.
///
/// Attribute `a` of candidate `i` lives at `data[a * n + i]`: rows 0–3 are
/// center-x, center-y, width, height (model coordinates), rows 4–83 are
/// per-class scores. Keeps the best class per candidate above `threshold`.
fn decode_predictions(data: &[f32], threshold: f32) -> Result<Vec<BoundingBox>, DetectorError> {
    let attrs = YOLO_BOX_ATTRS + YOLO_NUM_CLASSES;
    if data.is_empty() || data.len() % attrs != 0 {
        return Err(DetectorError::InferenceFailed(format!(
            "unexpected output length {} (not a multiple of {attrs})",
            data.len()
        )));
    }
    let n = data.len() / attrs;
    let attr = |a: usize, i: usize| data[a * n + i];

    let mut boxes = Vec::new();
    for i in 0..n {
        let mut best_class = 0usize;
        let mut best_score = 0.0f32;
        for c in 0..YOLO_NUM_CLASSES {
            let score = attr(YOLO_BOX_ATTRS + c, i);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score <= threshold {
            continue;
        }

        let cx = attr(0, i);
        let cy = attr(1, i);
        let w = attr(2, i);
        let h = attr(3, i);

        boxes.push(BoundingBox {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            width: w,
            height: h,
            class_index: best_class,
            confidence: best_score,
        });
    }

    Ok(boxes)
}

/// Per-class Non-Maximum Suppression: remove overlapping detections of the
/// same class, keeping the highest-confidence box.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[j].class_index != detections[i].class_index {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width * a.height;
    let area_b = b.width * b.height;
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, class_index: usize, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            class_index,
            confidence: conf,
        }
    }

    /// Build a flat [84][n] head with the given (cx, cy, w, h, class, score)
    /// candidates.
    fn make_head(candidates: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let n = candidates.len();
        let mut data = vec![0.0f32; (YOLO_BOX_ATTRS + YOLO_NUM_CLASSES) * n];
        for (i, &(cx, cy, w, h, class, score)) in candidates.iter().enumerate() {
            data[i] = cx;
            data[n + i] = cy;
            data[2 * n + i] = w;
            data[3 * n + i] = h;
            data[(YOLO_BOX_ATTRS + class) * n + i] = score;
        }
        data
    }

    #[test]
    fn test_decode_keeps_confident_candidate() {
        let data = make_head(&[(320.0, 320.0, 100.0, 50.0, labels::PERSON, 0.9)]);
        let boxes = decode_predictions(&data, YOLO_CONFIDENCE_THRESHOLD).unwrap();
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.class_index, labels::PERSON);
        assert!((b.x - 270.0).abs() < 1e-4);
        assert!((b.y - 295.0).abs() < 1e-4);
        assert!((b.width - 100.0).abs() < 1e-4);
        assert!((b.height - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_filters_low_confidence() {
        let data = make_head(&[
            (100.0, 100.0, 40.0, 40.0, labels::DOG, 0.8),
            (200.0, 200.0, 40.0, 40.0, labels::CAT, 0.1),
        ]);
        let boxes = decode_predictions(&data, YOLO_CONFIDENCE_THRESHOLD).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_index, labels::DOG);
    }

    #[test]
    fn test_decode_picks_best_class() {
        let n = 1;
        let mut data = vec![0.0f32; (YOLO_BOX_ATTRS + YOLO_NUM_CLASSES) * n];
        data[0] = 50.0; // cx
        data[n] = 50.0; // cy
        data[2 * n] = 20.0; // w
        data[3 * n] = 20.0; // h
        data[(YOLO_BOX_ATTRS + labels::CAT) * n] = 0.4;
        data[(YOLO_BOX_ATTRS + labels::DOG) * n] = 0.7;
        let boxes = decode_predictions(&data, YOLO_CONFIDENCE_THRESHOLD).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_index, labels::DOG);
        assert!((boxes[0].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_malformed_length() {
        let data = vec![0.0f32; 83];
        assert!(decode_predictions(&data, 0.25).is_err());
    }

    #[test]
    fn test_iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 0, 1.0);
        let b = make_box(20.0, 20.0, 10.0, 10.0, 0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 0, 1.0);
        // overlap 5x10 = 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let detections = vec![
            make_box(0.0, 0.0, 100.0, 100.0, labels::PERSON, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, labels::PERSON, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, labels::PERSON, 0.7),
        ];
        let result = nms(detections, YOLO_NMS_THRESHOLD);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let detections = vec![
            make_box(0.0, 0.0, 100.0, 100.0, labels::PERSON, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, labels::DOG, 0.8),
        ];
        let result = nms(detections, YOLO_NMS_THRESHOLD);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], YOLO_NMS_THRESHOLD).is_empty());
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = RgbImage::from_pixel(320, 240, image::Rgb([255, 128, 0]));
        let tensor = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE]);
        // uniform input stays uniform after resize; channels normalized
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 10, 10]] - 128.0 / 255.0).abs() < 1e-2);
        assert!(tensor[[0, 2, 10, 10]].abs() < 1e-3);
    }
}
