//! Device-side queue of captures waiting to be submitted.
//!
//! The whole queue lives in one versioned JSON document. Every mutation reads
//! the document, applies the change and writes it back with a
//! compare-and-swap, retrying when another writer got there first.

pub mod entry;
pub mod kv;
pub mod sync;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

pub use entry::{
    hydrate, Capture, CaptureContext, ImageInput, QueueEntry, StoredImage, UploadableImage,
};
pub use kv::{KvStore, MemoryKv, RedbStore};

pub const QUEUE_KEY: &str = "stockcount/offline-queue";

const MAX_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("queue entry not found: {0}")]
    NotFound(String),

    #[error("rejected by server ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Persisted form of the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDocument {
    pub version: u64,
    pub entries: Vec<QueueEntry>,
}

pub struct OfflineQueue<S: KvStore> {
    store: S,
}

impl OfflineQueue<RedbStore> {
    /// Open the queue stored in a redb file, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        Ok(Self::new(RedbStore::open(path)?))
    }
}

impl<S: KvStore> OfflineQueue<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<(Option<Vec<u8>>, QueueDocument), QueueError> {
        match self.store.get(QUEUE_KEY)? {
            Some(raw) => {
                let document = serde_json::from_slice(&raw)?;
                Ok((Some(raw), document))
            }
            None => Ok((None, QueueDocument::default())),
        }
    }

    /// Apply `change` to the document and persist it atomically.
    fn update<T>(
        &self,
        mut change: impl FnMut(&mut QueueDocument) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        for _ in 0..MAX_ATTEMPTS {
            let (raw, mut document) = self.load()?;
            let result = change(&mut document)?;
            document.version += 1;
            let encoded = serde_json::to_vec(&document)?;
            if self
                .store
                .compare_and_swap(QUEUE_KEY, raw.as_deref(), &encoded)?
            {
                return Ok(result);
            }
            log::debug!("Offline queue changed underneath us, retrying");
        }
        Err(QueueError::Storage(format!(
            "queue update lost {} races in a row",
            MAX_ATTEMPTS
        )))
    }

    /// Store a capture. Returns the queued entry with its local id.
    pub fn enqueue(&self, capture: Capture) -> Result<QueueEntry, QueueError> {
        let image = capture.image.map(ImageInput::into_stored).transpose()?;
        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            captured_at: Utc::now(),
            event_id: capture.event_id,
            warehouse_code: capture.warehouse_code,
            stock_code: capture.stock_code,
            case_barcode: capture.case_barcode,
            unit_barcode: capture.unit_barcode,
            lot_number: capture.lot_number,
            description: capture.description,
            recount_task_id: capture.recount_task_id,
            quantities: capture.quantities,
            image,
            context: capture.context,
        };

        self.update(|document| {
            document.entries.push(entry.clone());
            Ok(())
        })?;
        log::info!("Queued capture {} for {}", entry.id, entry.product_label());
        Ok(entry)
    }

    /// Entries in capture order.
    pub fn list(&self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.load()?.1.entries)
    }

    pub fn get(&self, id: &str) -> Result<QueueEntry, QueueError> {
        self.load()?
            .1
            .entries
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    pub fn hydrate(&self, entry: &QueueEntry) -> Result<Option<UploadableImage>, QueueError> {
        hydrate(entry)
    }

    /// Remove one entry. Returns false if it was not queued.
    pub fn remove(&self, id: &str) -> Result<bool, QueueError> {
        self.update(|document| {
            let before = document.entries.len();
            document.entries.retain(|e| e.id != id);
            Ok(document.entries.len() != before)
        })
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, QueueError> {
        let removed = self.update(|document| Ok(std::mem::take(&mut document.entries).len()))?;
        log::info!("Cleared {} queued capture(s)", removed);
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.load()?.1.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}
