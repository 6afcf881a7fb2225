//! Application state and operations.
//!
//! Glues the session state machine, credential store, gallery, and engine
//! handle together. Every gallery/detection operation is gated on an
//! active session; auth operations are not (the login view owns the
//! camera before anyone is signed in).

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use watchpost_core::{Descriptor, DescriptorError};
use watchpost_store::{CredentialStore, Gallery, ImageRecord, Origin, StoreError, UserRecord};

use crate::engine::{Analysis, EngineError, EngineHandle};
use crate::session::{SessionState, Tab};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("username and password must not be empty")]
    EmptyCredentials,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("wrong password")]
    WrongPassword,
    #[error("no face enrolled for {0}")]
    NoFaceEnrolled(String),
    #[error("no face detected in frame")]
    NoFaceInFrame,
    #[error("face mismatch (distance {distance:.3})")]
    FaceMismatch { distance: f32 },
    #[error("image not found: {0}")]
    UnknownImage(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode: {0}")]
    Image(#[from] image::ImageError),
}

/// One gallery page as shown to the view layer.
#[derive(Debug, Serialize)]
pub struct GalleryPage {
    pub origin: Origin,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
    pub entries: Vec<PageEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct App {
    store: CredentialStore,
    gallery: Gallery,
    session: SessionState,
    engine: EngineHandle,
    page: usize,
    page_size: usize,
    match_threshold: f32,
}

impl App {
    pub fn new(
        store: CredentialStore,
        engine: EngineHandle,
        page_size: usize,
        match_threshold: f32,
    ) -> Self {
        Self {
            store,
            gallery: Gallery::new(),
            session: SessionState::new(),
            engine,
            page: 1,
            page_size,
            match_threshold,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn gallery_len(&self, origin: Origin) -> usize {
        self.gallery.len(origin)
    }

    fn require_auth(&self) -> Result<(), AppError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(AppError::NotAuthenticated)
        }
    }

    fn active_origin(&self) -> Result<Origin, AppError> {
        self.session
            .tab()
            .map(|t| t.origin())
            .ok_or(AppError::NotAuthenticated)
    }

    /// Capture a frame and turn it into a descriptor, for enrollment and
    /// face login. The frame is not added to the gallery.
    async fn capture_descriptor(&self) -> Result<Descriptor, AppError> {
        let record = self.engine.capture_still().await?;
        match self.engine.extract_descriptor(record.data).await? {
            Some(descriptor) => Ok(descriptor),
            None => Err(AppError::NoFaceInFrame),
        }
    }

    /// Register a new user and start their session.
    ///
    /// With `enroll_face` set, a face is captured and must be present.
    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
        enroll_face: bool,
    ) -> Result<(), AppError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AppError::EmptyCredentials);
        }

        let descriptor = if enroll_face {
            Some(self.capture_descriptor().await?)
        } else {
            None
        };

        self.store.insert(UserRecord {
            username: username.to_string(),
            password: password.to_string(),
            descriptor: descriptor.map(|d| d.values().to_vec()),
        })?;

        self.session.authenticate(username.to_string());
        self.page = 1;
        tracing::info!(username, enrolled_face = enroll_face, "user registered");
        Ok(())
    }

    pub async fn login_password(&mut self, username: &str, password: &str) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_username(username)
            .ok_or_else(|| AppError::UnknownUser(username.to_string()))?;

        // Verbatim comparison; see the hashing TODO on UserRecord.
        if user.password != password {
            return Err(AppError::WrongPassword);
        }

        self.session.authenticate(username.to_string());
        self.page = 1;
        Ok(())
    }

    /// Log in by face: capture, extract, compare against the enrolled
    /// descriptor. Returns the measured distance on success.
    pub async fn login_face(&mut self, username: &str) -> Result<f32, AppError> {
        let enrolled = {
            let user = self
                .store
                .find_by_username(username)
                .ok_or_else(|| AppError::UnknownUser(username.to_string()))?;
            user.descriptor
                .clone()
                .ok_or_else(|| AppError::NoFaceEnrolled(username.to_string()))?
        };

        let probe = self.capture_descriptor().await?;
        let distance = Descriptor::new(enrolled).distance(&probe)?;

        if distance < self.match_threshold {
            tracing::info!(username, distance, "face login matched");
            self.session.authenticate(username.to_string());
            self.page = 1;
            Ok(distance)
        } else {
            tracing::info!(username, distance, "face login rejected");
            Err(AppError::FaceMismatch { distance })
        }
    }

    pub async fn logout(&mut self) {
        if self.session.logout() {
            self.page = 1;
            if let Err(e) = self.engine.release_camera().await {
                tracing::warn!(error = %e, "camera release on logout failed");
            }
        }
    }

    /// Switch the active tab, resetting pagination and releasing the
    /// camera when leaving the capture view.
    pub async fn switch_tab(&mut self, tab: Tab) -> Result<(), AppError> {
        self.require_auth()?;
        let previous = self.session.switch_tab(tab);
        self.page = 1;

        if previous == Some(Tab::Camera) && tab != Tab::Camera {
            if let Err(e) = self.engine.release_camera().await {
                tracing::warn!(error = %e, "camera release on tab switch failed");
            }
        }
        Ok(())
    }

    /// Capture a still into the local partition.
    pub async fn capture_still(&mut self) -> Result<Uuid, AppError> {
        self.require_auth()?;
        let record = self.engine.capture_still().await?;
        let id = record.id;
        self.gallery.append(Origin::Local, vec![record]);
        self.page = 1;
        Ok(id)
    }

    /// Ingest image files into the intake partition.
    ///
    /// Files that fail to read or decode are logged and skipped; the rest
    /// are delivered. Returns how many records were added.
    pub fn ingest_files(&mut self, paths: &[String]) -> Result<usize, AppError> {
        self.require_auth()?;

        let mut records = Vec::new();
        for path in paths {
            match ingest_one(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path, error = %e, "skipping unreadable intake file");
                }
            }
        }

        let count = records.len();
        if count > 0 {
            self.gallery.append(Origin::Intake, records);
            self.page = 1;
        }
        tracing::info!(requested = paths.len(), ingested = count, "file intake complete");
        Ok(count)
    }

    /// One page of the active tab's partition (clamped).
    pub fn page(&mut self, page_no: usize) -> Result<GalleryPage, AppError> {
        self.require_auth()?;
        let origin = self.active_origin()?;

        let page_count = self.gallery.page_count(origin, self.page_size);
        let page = page_no.clamp(1, page_count);
        self.page = page;

        let entries = self
            .gallery
            .page(origin, page, self.page_size)
            .iter()
            .map(|r| PageEntry {
                id: r.id,
                created_at: r.created_at,
            })
            .collect();

        Ok(GalleryPage {
            origin,
            page,
            page_count,
            total: self.gallery.len(origin),
            entries,
        })
    }

    /// Run the detection pipeline on a gallery image.
    pub async fn analyze(&self, id: Uuid) -> Result<Analysis, AppError> {
        self.require_auth()?;
        let record = self.gallery.find(id).ok_or(AppError::UnknownImage(id))?;
        Ok(self.engine.analyze(record.data.clone()).await?)
    }
}

/// Read and validate one intake file, keeping its original encoded bytes.
fn ingest_one(path: &str) -> Result<ImageRecord, AppError> {
    let data = std::fs::read(path)?;
    // Decode to validate the payload; the record keeps the original bytes.
    image::load_from_memory(&data)?;
    Ok(ImageRecord::new(Origin::Intake, data))
}
