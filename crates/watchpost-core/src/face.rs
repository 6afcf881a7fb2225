//! Face descriptor extraction via ONNX Runtime.
//!
//! Two-stage pipeline over the pretrained face model bundle: an
//! UltraFace-style locator proposes face boxes, then an embedding network
//! turns the best crop into a 128-dimensional descriptor. "No face in
//! frame" is a normal outcome, not an error.

use crate::types::Descriptor;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Locator constants (UltraFace RFB-320 convention) ---
const LOCATOR_INPUT_WIDTH: usize = 320;
const LOCATOR_INPUT_HEIGHT: usize = 240;
const LOCATOR_MEAN: f32 = 127.0;
const LOCATOR_STD: f32 = 128.0;
const LOCATOR_SCORE_THRESHOLD: f32 = 0.7;
const LOCATOR_NMS_THRESHOLD: f32 = 0.3;

// --- Encoder constants (different normalization!) ---
const ENCODER_INPUT_SIZE: usize = 112;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 127.5;
const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("model file not found: {0} — place the face model bundle in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face proposal in normalized [0, 1] image coordinates.
#[derive(Debug, Clone, Copy)]
struct FaceBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Output tensor indices of the locator: (scores, boxes).
type LocatorOutputIndices = (usize, usize);

/// Face descriptor extractor over the locator + encoder bundle.
pub struct FaceEmbedder {
    locator: Session,
    encoder: Session,
    locator_outputs: LocatorOutputIndices,
}

impl FaceEmbedder {
    /// Load both ONNX models of the face bundle.
    pub fn load(locator_path: &str, encoder_path: &str) -> Result<Self, FaceError> {
        for path in [locator_path, encoder_path] {
            if !Path::new(path).exists() {
                return Err(FaceError::ModelNotFound(path.to_string()));
            }
        }

        let locator = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(locator_path)?;

        let output_names: Vec<String> = locator
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let locator_outputs = discover_locator_outputs(&output_names);

        tracing::info!(
            path = locator_path,
            outputs = ?output_names,
            ?locator_outputs,
            "loaded face locator model"
        );

        let encoder = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(encoder_path)?;

        tracing::info!(
            path = encoder_path,
            inputs = ?encoder.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            "loaded face encoder model"
        );

        Ok(Self {
            locator,
            encoder,
            locator_outputs,
        })
    }

    /// Extract a descriptor for the most confident face in the image.
    ///
    /// Returns `Ok(None)` when no face clears the locator threshold.
    pub fn extract(&mut self, image: &RgbImage) -> Result<Option<Descriptor>, FaceError> {
        let Some(face) = self.locate(image)? else {
            return Ok(None);
        };

        let Some(crop) = crop_face(image, &face) else {
            // Degenerate box after clamping to image bounds
            tracing::debug!(?face.score, "face box collapsed to empty crop");
            return Ok(None);
        };

        let descriptor = self.embed(&crop)?;
        Ok(Some(descriptor))
    }

    /// Run the locator and return the best face proposal, if any.
    fn locate(&mut self, image: &RgbImage) -> Result<Option<FaceBox>, FaceError> {
        let input = preprocess_locator(image);

        let outputs = self
            .locator
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (score_idx, box_idx) = self.locator_outputs;
        let (_, scores) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::InferenceFailed(format!("locator scores: {e}")))?;
        let (_, boxes) = outputs[box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::InferenceFailed(format!("locator boxes: {e}")))?;

        let mut candidates = decode_faces(scores, boxes, LOCATOR_SCORE_THRESHOLD)?;
        candidates = face_nms(candidates, LOCATOR_NMS_THRESHOLD);

        Ok(candidates.into_iter().next())
    }

    /// Embed a face crop into an L2-normalized descriptor.
    fn embed(&mut self, crop: &RgbImage) -> Result<Descriptor, FaceError> {
        let input = preprocess_encoder(crop);

        let outputs = self
            .encoder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(FaceError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::new(l2_normalize(raw)))
    }
}

/// Discover the locator output ordering by name.
///
/// UltraFace exports name their outputs "scores" and "boxes"; generic
/// exports fall back to the standard positional ordering (0 = scores,
/// 1 = boxes).
fn discover_locator_outputs(names: &[String]) -> LocatorOutputIndices {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(
                ?names,
                "locator output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Resize to the locator input and normalize to NCHW.
fn preprocess_locator(image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        LOCATOR_INPUT_WIDTH as u32,
        LOCATOR_INPUT_HEIGHT as u32,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, LOCATOR_INPUT_HEIGHT, LOCATOR_INPUT_WIDTH));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (c, &v) in pixel.0.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = (v as f32 - LOCATOR_MEAN) / LOCATOR_STD;
        }
    }
    tensor
}

/// Resize a face crop to the encoder input and normalize symmetrically.
fn preprocess_encoder(crop: &RgbImage) -> Array4<f32> {
    let size = ENCODER_INPUT_SIZE as u32;
    let resized = image::imageops::resize(crop, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (c, &v) in pixel.0.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = (v as f32 - ENCODER_MEAN) / ENCODER_STD;
        }
    }
    tensor
}

/// Decode flat locator outputs: scores `[1, N, 2]` (background, face) and
/// boxes `[1, N, 4]` (normalized corner coordinates).
fn decode_faces(scores: &[f32], boxes: &[f32], threshold: f32) -> Result<Vec<FaceBox>, FaceError> {
    if scores.len() % 2 != 0 || boxes.len() % 4 != 0 || scores.len() / 2 != boxes.len() / 4 {
        return Err(FaceError::InferenceFailed(format!(
            "locator output shape mismatch: {} scores vs {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let n = scores.len() / 2;
    let mut faces = Vec::new();
    for i in 0..n {
        let score = scores[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        faces.push(FaceBox {
            x1: boxes[i * 4],
            y1: boxes[i * 4 + 1],
            x2: boxes[i * 4 + 2],
            y2: boxes[i * 4 + 3],
            score,
        });
    }

    Ok(faces)
}

/// Greedy NMS over face proposals, best score first.
fn face_nms(mut faces: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    faces.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for f in faces {
        if keep.iter().all(|k| face_iou(k, &f) <= iou_threshold) {
            keep.push(f);
        }
    }
    keep
}

fn face_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Cut the face region out of the source image, clamped to its bounds.
///
/// Returns `None` when the clamped region is empty.
fn crop_face(image: &RgbImage, face: &FaceBox) -> Option<RgbImage> {
    let (width, height) = image.dimensions();

    let x1 = (face.x1 * width as f32).floor().max(0.0) as u32;
    let y1 = (face.y1 * height as f32).floor().max(0.0) as u32;
    let x2 = ((face.x2 * width as f32).ceil() as u32).min(width);
    let y2 = ((face.y2 * height as f32).ceil() as u32).min(height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// L2-normalize a raw embedding; zero vectors pass through unchanged.
fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
