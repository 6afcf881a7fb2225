//! watchpost-core — Detection and recognition engine.
//!
//! Wraps pretrained ONNX models (a YOLO-family object detector and a face
//! descriptor pipeline) behind typed adapters, and adds the color-threshold
//! flame heuristic and box overlay rendering. Nothing in here designs a
//! model; the models are opaque assets consumed via ONNX Runtime.

pub mod detector;
pub mod face;
pub mod hazard;
pub mod labels;
pub mod overlay;
pub mod types;

pub use detector::{DetectorError, ObjectDetector};
pub use face::{FaceEmbedder, FaceError};
pub use types::{
    BoundingBox, CategoryLabel, Descriptor, DescriptorError, DetectionResult,
    DESCRIPTOR_MATCH_THRESHOLD,
};
