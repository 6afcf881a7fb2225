use std::path::PathBuf;
use watchpost_core::DESCRIPTOR_MATCH_THRESHOLD;
use watchpost_store::{gallery::DEFAULT_PAGE_SIZE, users::USERS_FILE_NAME};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory holding the persisted user slot.
    pub data_dir: PathBuf,
    /// Face distance below which a login matches.
    pub match_threshold: f32,
    /// Gallery page size.
    pub page_size: usize,
    /// Telemetry service base URL.
    pub telemetry_base: String,
    /// Device id queried on each poll.
    pub telemetry_device: String,
    pub telemetry_user: String,
    pub telemetry_password: String,
    /// Seconds between telemetry polls.
    pub telemetry_poll_secs: u64,
    /// Per-request telemetry timeout in seconds.
    pub telemetry_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `WATCHPOST_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("WATCHPOST_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models"));

        let data_dir = std::env::var("WATCHPOST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("watchpost")
            });

        Self {
            camera_device: std::env::var("WATCHPOST_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            data_dir,
            match_threshold: env_f32("WATCHPOST_MATCH_THRESHOLD", DESCRIPTOR_MATCH_THRESHOLD),
            page_size: env_usize("WATCHPOST_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            telemetry_base: std::env::var("WATCHPOST_TELEMETRY_BASE")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            telemetry_device: std::env::var("WATCHPOST_TELEMETRY_DEVICE")
                .unwrap_or_else(|_| "dev01".to_string()),
            telemetry_user: std::env::var("WATCHPOST_TELEMETRY_USER")
                .unwrap_or_else(|_| "admin".to_string()),
            telemetry_password: std::env::var("WATCHPOST_TELEMETRY_PASSWORD")
                .unwrap_or_else(|_| "abc123456".to_string()),
            telemetry_poll_secs: env_u64("WATCHPOST_TELEMETRY_POLL_SECS", 5),
            telemetry_timeout_secs: env_u64("WATCHPOST_TELEMETRY_TIMEOUT_SECS", 10),
        }
    }

    /// Path to the persisted user slot.
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE_NAME)
    }

    /// Path to the object detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("yolov8n.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face locator model of the face bundle.
    pub fn face_locator_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face encoder model of the face bundle.
    pub fn face_encoder_model_path(&self) -> String {
        self.model_dir
            .join("mobilefacenet.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
