use crate::labels;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two face descriptors denote the same identity when their Euclidean
/// distance is strictly below this value.
pub const DESCRIPTOR_MATCH_THRESHOLD: f32 = 0.6;

/// Minimum confidence for a detector box to decide the category.
pub const CATEGORY_SCORE_THRESHOLD: f32 = 0.5;

/// One detected object, in model input coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Index into the fixed class vocabulary ([`labels::COCO_CLASSES`]).
    pub class_index: usize,
    pub confidence: f32,
}

impl BoundingBox {
    /// Class name from the fixed vocabulary, if the index is in range.
    pub fn class_name(&self) -> Option<&'static str> {
        labels::class_name(self.class_index)
    }
}

/// Output of one detector invocation.
///
/// Boxes are in model input coordinates; `x_ratio`/`y_ratio` scale them
/// back to the source image (see [`crate::overlay::render_overlay`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub boxes: Vec<BoundingBox>,
    pub x_ratio: f32,
    pub y_ratio: f32,
}

/// Closed classification derived from detector output and the flame heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryLabel {
    Person,
    DogOrCat,
    Fire,
    Unknown,
}

impl CategoryLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryLabel::Person => "person",
            CategoryLabel::DogOrCat => "dogOrCat",
            CategoryLabel::Fire => "fire",
            CategoryLabel::Unknown => "unknown",
        }
    }
}

/// Classify a detection result into the closed category set.
///
/// Tracks the maximum confidence seen for "person" and, separately, for
/// "dog"/"cat" across every box. Person wins when both clear the
/// threshold.
pub fn classify(result: &DetectionResult) -> CategoryLabel {
    let mut person_score = 0.0f32;
    let mut dog_cat_score = 0.0f32;

    for b in &result.boxes {
        if b.class_index == labels::PERSON && b.confidence > person_score {
            person_score = b.confidence;
        }
        if (b.class_index == labels::DOG || b.class_index == labels::CAT)
            && b.confidence > dog_cat_score
        {
            dog_cat_score = b.confidence;
        }
    }

    if person_score >= CATEGORY_SCORE_THRESHOLD {
        CategoryLabel::Person
    } else if dog_cat_score >= CATEGORY_SCORE_THRESHOLD {
        CategoryLabel::DogOrCat
    } else {
        CategoryLabel::Unknown
    }
}

/// Combine the detector classification with the flame heuristic.
///
/// A positive hazard check overrides whatever the detector saw.
pub fn final_category(result: &DetectionResult, hazard: bool) -> CategoryLabel {
    if hazard {
        CategoryLabel::Fire
    } else {
        classify(result)
    }
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Fixed-length face embedding produced by the external descriptor model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance to another descriptor.
    ///
    /// Unequal lengths are an error, not a sentinel: a length mismatch
    /// means the stored descriptor came from a different model version and
    /// must not silently read as "no match".
    pub fn distance(&self, other: &Descriptor) -> Result<f32, DescriptorError> {
        if self.0.len() != other.0.len() {
            return Err(DescriptorError::DimensionMismatch {
                left: self.0.len(),
                right: other.0.len(),
            });
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Ok(sum.sqrt())
    }

    /// Identity decision at the given threshold (strictly below matches).
    pub fn matches(&self, other: &Descriptor, threshold: f32) -> Result<bool, DescriptorError> {
        Ok(self.distance(other)? < threshold)
    }
}
