//! D-Bus control surface for the watchpost daemon.
//!
//! Bus name: org.watchpost.Station1
//! Object path: /org/watchpost/Station1
//!
//! This is the daemon's view layer: every operation of the camera
//! application plus the latest telemetry snapshot. Structured results are
//! returned as JSON strings; failures map to D-Bus error replies.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use watchpost_store::Origin;
use zbus::interface;

use crate::app::{App, AppError};
use crate::session::Tab;
use crate::telemetry::TelemetryPoller;

pub struct StationService {
    app: Arc<Mutex<App>>,
    poller: TelemetryPoller,
}

impl StationService {
    pub fn new(app: App, poller: TelemetryPoller) -> Self {
        Self {
            app: Arc::new(Mutex::new(app)),
            poller,
        }
    }
}

fn fdo_err(e: AppError) -> zbus::fdo::Error {
    match e {
        AppError::NotAuthenticated => zbus::fdo::Error::AccessDenied(e.to_string()),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn json_reply<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.watchpost.Station1")]
impl StationService {
    /// Register a new user, optionally enrolling the current camera face.
    async fn register(
        &self,
        username: &str,
        password: &str,
        enroll_face: bool,
    ) -> zbus::fdo::Result<()> {
        tracing::info!(username, enroll_face, "register requested");
        self.app
            .lock()
            .await
            .register(username, password, enroll_face)
            .await
            .map_err(fdo_err)
    }

    async fn login_password(&self, username: &str, password: &str) -> zbus::fdo::Result<()> {
        tracing::info!(username, "password login requested");
        self.app
            .lock()
            .await
            .login_password(username, password)
            .await
            .map_err(fdo_err)
    }

    /// Log in by face; returns the measured descriptor distance.
    async fn login_face(&self, username: &str) -> zbus::fdo::Result<f64> {
        tracing::info!(username, "face login requested");
        let distance = self
            .app
            .lock()
            .await
            .login_face(username)
            .await
            .map_err(fdo_err)?;
        Ok(f64::from(distance))
    }

    async fn logout(&self) -> zbus::fdo::Result<()> {
        self.app.lock().await.logout().await;
        Ok(())
    }

    /// Capture one still into the local partition; returns the record id.
    async fn capture_still(&self) -> zbus::fdo::Result<String> {
        let id = self
            .app
            .lock()
            .await
            .capture_still()
            .await
            .map_err(fdo_err)?;
        Ok(id.to_string())
    }

    /// Ingest image files into the intake partition; returns how many
    /// records were added (unreadable files are skipped).
    async fn ingest_files(&self, paths: Vec<String>) -> zbus::fdo::Result<u32> {
        let count = self
            .app
            .lock()
            .await
            .ingest_files(&paths)
            .map_err(fdo_err)?;
        Ok(count as u32)
    }

    /// Switch the active tab ("camera" or "intake").
    async fn switch_tab(&self, tab: &str) -> zbus::fdo::Result<()> {
        let tab = Tab::parse(tab)
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("unknown tab: {tab}")))?;
        self.app.lock().await.switch_tab(tab).await.map_err(fdo_err)
    }

    /// One page of the active tab's partition, as JSON.
    async fn page(&self, page_no: u32) -> zbus::fdo::Result<String> {
        let page = self
            .app
            .lock()
            .await
            .page(page_no as usize)
            .map_err(fdo_err)?;
        json_reply(&page)
    }

    /// Run the detection pipeline on a gallery image, as JSON. The
    /// annotated overlay comes back base64-encoded.
    async fn analyze(&self, id: &str) -> zbus::fdo::Result<String> {
        let id: Uuid = id
            .parse()
            .map_err(|_| zbus::fdo::Error::InvalidArgs(format!("not an image id: {id}")))?;
        let analysis = self.app.lock().await.analyze(id).await.map_err(fdo_err)?;
        json_reply(&serde_json::json!({
            "category": analysis.category.as_str(),
            "hazard": analysis.hazard,
            "boxes": analysis.detections.boxes,
            "xRatio": analysis.detections.x_ratio,
            "yRatio": analysis.detections.y_ratio,
            "annotatedPng": BASE64.encode(&analysis.annotated_png),
        }))
    }

    /// Usable capture devices on this host, as JSON.
    async fn list_devices(&self) -> zbus::fdo::Result<String> {
        let devices = tokio::task::spawn_blocking(watchpost_hw::Camera::list_devices)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        let devices: Vec<_> = devices
            .into_iter()
            .map(|d| {
                serde_json::json!({
                    "path": d.path,
                    "name": d.name,
                    "driver": d.driver,
                    "bus": d.bus,
                })
            })
            .collect();
        json_reply(&devices)
    }

    /// Latest telemetry snapshot, as JSON.
    async fn telemetry(&self) -> zbus::fdo::Result<String> {
        json_reply(&self.poller.latest())
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let app = self.app.lock().await;
        let session = app.session();
        json_reply(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "authenticated": session.is_authenticated(),
            "username": session.username(),
            "tab": session.tab().map(|t| t.as_str()),
            "localImages": app.gallery_len(Origin::Local),
            "intakeImages": app.gallery_len(Origin::Intake),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_authenticated_maps_to_access_denied() {
        assert!(matches!(
            fdo_err(AppError::NotAuthenticated),
            zbus::fdo::Error::AccessDenied(_)
        ));
        assert!(matches!(
            fdo_err(AppError::WrongPassword),
            zbus::fdo::Error::Failed(_)
        ));
    }
}
