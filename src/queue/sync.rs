//! Upload queued captures to the ingestion endpoint, one at a time.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use super::{hydrate, KvStore, OfflineQueue, QueueEntry, QueueError, UploadableImage};
use crate::models::TierQuantities;

/// Server acknowledgement of one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub count_id: Uuid,
    pub total_units: i64,
    pub duplicate: bool,
}

/// Delivers a single queued capture.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(
        &self,
        entry: &QueueEntry,
        image: Option<UploadableImage>,
    ) -> Result<Accepted, QueueError>;
}

/// Transient per-entry state reported while a sync runs. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Syncing,
    Synced { count_id: Uuid, total_units: i64 },
    Error(String),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// The server rejected our credentials; remaining entries were skipped.
    pub auth_stopped: bool,
}

/// Submit queued entries in capture order, or just `only` when given.
/// Accepted entries are removed; rejected ones stay queued.
pub async fn sync_entries<S: KvStore>(
    queue: &OfflineQueue<S>,
    submitter: &dyn Submitter,
    only: Option<&str>,
    mut on_state: impl FnMut(&QueueEntry, &EntryState),
) -> Result<SyncReport, QueueError> {
    let entries = match only {
        Some(id) => vec![queue.get(id)?],
        None => queue.list()?,
    };

    let mut report = SyncReport::default();
    for entry in entries {
        on_state(&entry, &EntryState::Syncing);

        let result = match hydrate(&entry) {
            Ok(image) => submitter.submit(&entry, image).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(accepted) => {
                queue.remove(&entry.id)?;
                if accepted.duplicate {
                    log::info!("Capture {} was already recorded as {}", entry.id, accepted.count_id);
                }
                on_state(
                    &entry,
                    &EntryState::Synced {
                        count_id: accepted.count_id,
                        total_units: accepted.total_units,
                    },
                );
                report.synced.push(entry.id);
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!("Capture {} not synced: {}", entry.id, message);
                on_state(&entry, &EntryState::Error(message.clone()));
                report.failed.push((entry.id, message));
                if matches!(e, QueueError::Rejected { status: 401, .. }) {
                    report.auth_stopped = true;
                    break;
                }
            }
        }
    }

    Ok(report)
}

#[derive(Deserialize)]
struct SubmitReply {
    id: Uuid,
    total_units: i64,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Deserialize)]
struct ErrorReply {
    code: String,
    message: String,
}

/// Posts captures as `multipart/form-data` to `{server}/api/counts`.
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpSubmitter {
    pub fn new(server: &str, token: &str, timeout: Duration) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/counts", server.trim_end_matches('/')),
            token: token.to_string(),
        })
    }
}

fn build_form(entry: &QueueEntry, image: Option<UploadableImage>) -> Result<Form, QueueError> {
    let mut form = Form::new()
        .text("client_ref", entry.id.clone())
        .text("event_id", entry.event_id.to_string())
        .text("warehouse_code", entry.warehouse_code.clone());

    let optional = [
        ("stock_code", &entry.stock_code),
        ("case_barcode", &entry.case_barcode),
        ("unit_barcode", &entry.unit_barcode),
        ("lot_number", &entry.lot_number),
        ("description", &entry.description),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            form = form.text(name, value.clone());
        }
    }
    if let Some(task_id) = entry.recount_task_id {
        form = form.text("recount_task_id", task_id.to_string());
    }

    for (name, value) in TierQuantities::FIELDS.iter().zip(entry.quantities.values()) {
        form = form.text(*name, value.to_string());
    }

    if let Some(image) = image {
        let part = Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(&image.mime_type)
            .map_err(|e| QueueError::InvalidImage(e.to_string()))?;
        form = form.part("photo", part);
    }

    Ok(form)
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(
        &self,
        entry: &QueueEntry,
        image: Option<UploadableImage>,
    ) -> Result<Accepted, QueueError> {
        let form = build_form(entry, image)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        if status.is_success() {
            let reply: SubmitReply = serde_json::from_str(&body)?;
            return Ok(Accepted {
                count_id: reply.id,
                total_units: reply.total_units,
                duplicate: reply.duplicate,
            });
        }

        let (code, message) = match serde_json::from_str::<ErrorReply>(&body) {
            Ok(reply) => (reply.code, reply.message),
            Err(_) => (status.as_str().to_string(), body),
        };
        Err(QueueError::Rejected {
            status: status.as_u16(),
            code,
            message,
        })
    }
}
