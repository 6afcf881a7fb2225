//! Camera and inference engine.
//!
//! A dedicated OS thread owns the camera handle and both model sessions;
//! D-Bus handlers talk to it through a clone-safe [`EngineHandle`] with
//! mpsc/oneshot request-reply. Requests are served strictly in order, so
//! the queue doubles as the in-flight guard for lazy model loading:
//! concurrent callers simply line up behind the first load.

use image::RgbImage;
use std::io::Cursor;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use watchpost_core::detector::DetectorError;
use watchpost_core::face::FaceError;
use watchpost_core::{hazard, overlay, types, CategoryLabel, Descriptor, DetectionResult};
use watchpost_core::{FaceEmbedder, ObjectDetector};
use watchpost_hw::{Camera, CameraError};
use watchpost_store::{ImageRecord, Origin};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("face pipeline error: {0}")]
    Face(#[from] FaceError),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("captured frame has inconsistent dimensions")]
    BadFrame,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of analyzing one gallery image.
pub struct Analysis {
    pub category: CategoryLabel,
    pub hazard: bool,
    pub detections: DetectionResult,
    /// Source image with detector boxes drawn, PNG-encoded.
    pub annotated_png: Vec<u8>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    CaptureStill {
        reply: oneshot::Sender<Result<ImageRecord, EngineError>>,
    },
    ReleaseCamera {
        reply: oneshot::Sender<()>,
    },
    Analyze {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<Analysis, EngineError>>,
    },
    ExtractDescriptor {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Descriptor>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture one still from the camera as a local-origin image record.
    pub async fn capture_still(&self) -> Result<ImageRecord, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::CaptureStill { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Release the camera handle (tab switch / logout).
    pub async fn release_camera(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ReleaseCamera { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Run detection + hazard check on an encoded image.
    pub async fn analyze(&self, data: Vec<u8>) -> Result<Analysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Extract a face descriptor from an encoded image, `None` when no
    /// face is present.
    pub async fn extract_descriptor(&self, data: Vec<u8>) -> Result<Option<Descriptor>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExtractDescriptor {
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Paths the engine acquires its resources from.
pub struct EngineConfig {
    pub camera_device: String,
    pub detector_model: String,
    pub face_locator_model: String,
    pub face_encoder_model: String,
}

struct Models {
    detector: ObjectDetector,
    faces: FaceEmbedder,
}

struct Engine {
    cfg: EngineConfig,
    camera: Option<Camera>,
    models: Option<Models>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Nothing is acquired up front: the camera opens on the first capture and
/// the models load on the first detection/descriptor request. A failed
/// load is reported to that caller and retried on the next request, so a
/// missing model blocks detection without taking capture down with it.
pub fn spawn_engine(cfg: EngineConfig) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("watchpost-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut engine = Engine {
                cfg,
                camera: None,
                models: None,
            };
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::CaptureStill { reply } => {
                        let _ = reply.send(engine.capture_still());
                    }
                    EngineRequest::ReleaseCamera { reply } => {
                        engine.release_camera();
                        let _ = reply.send(());
                    }
                    EngineRequest::Analyze { data, reply } => {
                        let _ = reply.send(engine.analyze(&data));
                    }
                    EngineRequest::ExtractDescriptor { data, reply } => {
                        let _ = reply.send(engine.extract_descriptor(&data));
                    }
                }
            }
            tracing::info!("engine thread exiting");
            // Dropping the engine here closes the camera whatever path
            // brought the loop down.
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

impl Engine {
    fn ensure_camera(&mut self) -> Result<&mut Camera, EngineError> {
        let camera = match self.camera.take() {
            Some(camera) => camera,
            None => {
                let camera = Camera::open(&self.cfg.camera_device)?;
                tracing::info!(device = %self.cfg.camera_device, "camera acquired");
                camera
            }
        };
        Ok(self.camera.insert(camera))
    }

    /// Load both models on first use; cache on success only.
    fn ensure_models(&mut self) -> Result<&mut Models, EngineError> {
        let models = match self.models.take() {
            Some(models) => models,
            None => {
                let detector = ObjectDetector::load(&self.cfg.detector_model)?;
                let faces =
                    FaceEmbedder::load(&self.cfg.face_locator_model, &self.cfg.face_encoder_model)?;
                tracing::info!("inference models loaded");
                Models { detector, faces }
            }
        };
        Ok(self.models.insert(models))
    }

    fn capture_still(&mut self) -> Result<ImageRecord, EngineError> {
        let frame = self.ensure_camera()?.capture_frame()?;
        let image = RgbImage::from_raw(frame.width, frame.height, frame.data)
            .ok_or(EngineError::BadFrame)?;
        let png = encode_png(&image)?;
        tracing::debug!(sequence = frame.sequence, bytes = png.len(), "captured still");
        Ok(ImageRecord::new(Origin::Local, png))
    }

    fn release_camera(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!("camera released");
        }
    }

    fn analyze(&mut self, data: &[u8]) -> Result<Analysis, EngineError> {
        let image = decode_rgb(data)?;
        let hazard = hazard::detect_hazard(&image);

        let models = self.ensure_models()?;
        let detections = models.detector.detect(&image)?;
        let category = types::final_category(&detections, hazard);

        let annotated = overlay::render_overlay(&image, &detections);
        let annotated_png = encode_png(&annotated)?;

        tracing::info!(
            category = category.as_str(),
            hazard,
            boxes = detections.boxes.len(),
            "analysis complete"
        );

        Ok(Analysis {
            category,
            hazard,
            detections,
            annotated_png,
        })
    }

    fn extract_descriptor(&mut self, data: &[u8]) -> Result<Option<Descriptor>, EngineError> {
        let image = decode_rgb(data)?;
        let models = self.ensure_models()?;
        Ok(models.faces.extract(&image)?)
    }
}

fn decode_rgb(data: &[u8]) -> Result<RgbImage, EngineError> {
    Ok(image::load_from_memory(data)?.to_rgb8())
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, EngineError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bogus_engine() -> EngineHandle {
        spawn_engine(EngineConfig {
            camera_device: "/nonexistent/video99".to_string(),
            detector_model: "/nonexistent/yolov8n.onnx".to_string(),
            face_locator_model: "/nonexistent/version-RFB-320.onnx".to_string(),
            face_encoder_model: "/nonexistent/mobilefacenet.onnx".to_string(),
        })
    }

    fn sample_png() -> Vec<u8> {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([40, 50, 60]));
        encode_png(&image).unwrap()
    }

    #[tokio::test]
    async fn test_capture_reports_missing_camera() {
        let engine = bogus_engine();
        let err = engine.capture_still().await.unwrap_err();
        assert!(matches!(err, EngineError::Camera(CameraError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_analyze_reports_missing_model_and_retries() {
        let engine = bogus_engine();
        // model load failure is returned, not cached: both calls see it
        for _ in 0..2 {
            let err = engine.analyze(sample_png()).await.unwrap_err();
            assert!(matches!(err, EngineError::Detector(DetectorError::ModelNotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_analyze_rejects_undecodable_payload() {
        let engine = bogus_engine();
        let err = engine.analyze(vec![1, 2, 3, 4]).await.unwrap_err();
        assert!(matches!(err, EngineError::Image(_)));
    }

    #[tokio::test]
    async fn test_release_camera_is_idempotent() {
        let engine = bogus_engine();
        engine.release_camera().await.unwrap();
        engine.release_camera().await.unwrap();
    }

    #[test]
    fn test_png_round_trip() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 30]));
        let png = encode_png(&image).unwrap();
        let decoded = decode_rgb(&png).unwrap();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(*decoded.get_pixel(0, 0), image::Rgb([200, 10, 30]));
    }
}
