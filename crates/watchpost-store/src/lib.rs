//! watchpost-store — Persistence and in-memory collections.
//!
//! The credential store is a single serialized JSON slot; the gallery is
//! an in-memory, two-partition, most-recent-first image collection with a
//! clamping paginator. Neither owns any model or camera state.

pub mod gallery;
pub mod users;

pub use gallery::{Gallery, ImageRecord, Origin, DEFAULT_PAGE_SIZE};
pub use users::{CredentialStore, StoreError, UserRecord};
