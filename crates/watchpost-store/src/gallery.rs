//! Gallery store and paginator.
//!
//! Two independent origin partitions of captured images, ordered
//! most-recent-first. Pagination clamps out-of-range requests instead of
//! erroring. Records live for the session only; there is no delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Images per page (3 rows of 5 in the gallery view).
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Which partition an image belongs to. Partitions never merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Captured from the local camera.
    Local,
    /// Received via the simulated remote file intake.
    Intake,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Intake => "intake",
        }
    }
}

/// A captured image. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// Encoded image payload (PNG or the original file bytes).
    #[serde(skip)]
    pub data: Vec<u8>,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(origin: Origin, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            origin,
            created_at: Utc::now(),
        }
    }
}

/// In-memory two-partition image collection.
#[derive(Default)]
pub struct Gallery {
    local: Vec<ImageRecord>,
    intake: Vec<ImageRecord>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, origin: Origin) -> &Vec<ImageRecord> {
        match origin {
            Origin::Local => &self.local,
            Origin::Intake => &self.intake,
        }
    }

    /// Prepend records to the named partition (most-recent-first).
    ///
    /// The given order is preserved at the front of the partition.
    pub fn append(&mut self, origin: Origin, records: Vec<ImageRecord>) {
        let partition = match origin {
            Origin::Local => &mut self.local,
            Origin::Intake => &mut self.intake,
        };
        partition.splice(0..0, records);
    }

    pub fn len(&self, origin: Origin) -> usize {
        self.partition(origin).len()
    }

    pub fn is_empty(&self, origin: Origin) -> bool {
        self.partition(origin).is_empty()
    }

    /// Number of pages at the given size; never less than 1.
    pub fn page_count(&self, origin: Origin, page_size: usize) -> usize {
        let count = self.len(origin);
        std::cmp::max(1, count.div_ceil(page_size))
    }

    /// One page of the partition, 1-based.
    ///
    /// Out-of-range page numbers clamp to the valid range rather than
    /// erroring; an empty partition yields an empty page 1.
    pub fn page(&self, origin: Origin, page_no: usize, page_size: usize) -> &[ImageRecord] {
        let partition = self.partition(origin);
        let page_no = page_no.clamp(1, self.page_count(origin, page_size));
        let start = (page_no - 1) * page_size;
        let end = std::cmp::min(start + page_size, partition.len());
        if start >= end {
            return &[];
        }
        &partition[start..end]
    }

    /// Look up a record by id across both partitions.
    pub fn find(&self, id: Uuid) -> Option<&ImageRecord> {
        self.local
            .iter()
            .chain(self.intake.iter())
            .find(|r| r.id == id)
    }
}
