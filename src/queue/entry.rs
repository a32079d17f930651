use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dataurl, models::TierQuantities, photos::content_type_for};

use super::QueueError;

const ACCEPTED_MIME: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

/// An image held in the queue in text-safe form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
    pub filename: String,
    pub mime_type: String,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Image evidence as handed over by the capture step.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Raw bytes read from the camera or a file
    Binary {
        bytes: Vec<u8>,
        filename: String,
        mime_type: Option<String>,
        modified_at: Option<DateTime<Utc>>,
    },
    /// Already encoded text, from environments without binary handles
    DataUrl {
        data_url: String,
        filename: String,
        mime_type: Option<String>,
        modified_at: Option<DateTime<Utc>>,
    },
}

impl ImageInput {
    pub(crate) fn into_stored(self) -> Result<StoredImage, QueueError> {
        match self {
            ImageInput::Binary {
                bytes,
                filename,
                mime_type,
                modified_at,
            } => {
                if bytes.is_empty() {
                    return Err(QueueError::InvalidImage("image is empty".to_string()));
                }
                let mime_type = image_mime(mime_type.as_deref(), &filename, &bytes)?;
                Ok(StoredImage {
                    data_url: dataurl::encode(&mime_type, &bytes),
                    filename,
                    mime_type,
                    modified_at,
                })
            }
            ImageInput::DataUrl {
                data_url,
                filename,
                mime_type,
                modified_at,
            } => {
                // Validate now so a broken capture fails at enqueue, not at sync
                let decoded = dataurl::decode(&data_url)
                    .map_err(|e| QueueError::InvalidImage(e.to_string()))?;
                if decoded.bytes.is_empty() {
                    return Err(QueueError::InvalidImage("image is empty".to_string()));
                }
                let declared = mime_type.or(decoded.mime_type);
                let mime_type = image_mime(declared.as_deref(), &filename, &decoded.bytes)?;
                Ok(StoredImage {
                    data_url: dataurl::encode(&mime_type, &decoded.bytes),
                    filename,
                    mime_type,
                    modified_at,
                })
            }
        }
    }
}

/// Resolve the image type from the declared mime, then the filename
/// extension, then the leading bytes. Anything else could never be uploaded,
/// so it is refused at enqueue.
fn image_mime(declared: Option<&str>, filename: &str, bytes: &[u8]) -> Result<String, QueueError> {
    let declared = declared
        .map(|m| m.trim().to_ascii_lowercase())
        .map(|m| if m == "image/jpg" { "image/jpeg".to_string() } else { m })
        .filter(|m| ACCEPTED_MIME.contains(&m.as_str()));
    if let Some(mime) = declared {
        return Ok(mime);
    }

    let by_name = content_type_for(filename);
    if ACCEPTED_MIME.contains(&by_name) {
        return Ok(by_name.to_string());
    }

    sniff_mime(bytes).map(str::to_string).ok_or_else(|| {
        QueueError::InvalidImage(format!("{} is not a jpg, png, webp or heic image", filename))
    })
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG") {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && matches!(&bytes[8..12], b"heic" | b"heix" | b"mif1")
    {
        Some("image/heic")
    } else {
        None
    }
}

/// Everything a worker records for one capture, before it is queued.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: Option<String>,
    pub case_barcode: Option<String>,
    pub unit_barcode: Option<String>,
    pub lot_number: Option<String>,
    pub description: Option<String>,
    pub recount_task_id: Option<Uuid>,
    pub quantities: TierQuantities,
    pub image: Option<ImageInput>,
    pub context: CaptureContext,
}

/// Denormalized context shown alongside a queued capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureContext {
    pub branch: Option<String>,
    pub location: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// A capture waiting in the device queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: Option<String>,
    pub case_barcode: Option<String>,
    pub unit_barcode: Option<String>,
    pub lot_number: Option<String>,
    pub description: Option<String>,
    pub recount_task_id: Option<Uuid>,
    #[serde(default)]
    pub quantities: TierQuantities,
    pub image: Option<StoredImage>,
    #[serde(default)]
    pub context: CaptureContext,
}

impl QueueEntry {
    pub fn product_label(&self) -> &str {
        self.stock_code
            .as_deref()
            .or(self.case_barcode.as_deref())
            .or(self.unit_barcode.as_deref())
            .unwrap_or("-")
    }
}

/// A reconstructed image ready to upload as a binary part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadableImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Rebuild the uploadable image of an entry. Pure: reads nothing but the
/// entry itself.
pub fn hydrate(entry: &QueueEntry) -> Result<Option<UploadableImage>, QueueError> {
    let Some(image) = &entry.image else {
        return Ok(None);
    };
    let decoded =
        dataurl::decode(&image.data_url).map_err(|e| QueueError::InvalidImage(e.to_string()))?;
    Ok(Some(UploadableImage {
        bytes: decoded.bytes,
        filename: image.filename.clone(),
        mime_type: image.mime_type.clone(),
        modified_at: image.modified_at,
    }))
}
